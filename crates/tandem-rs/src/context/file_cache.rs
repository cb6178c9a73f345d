//! Least-recently-used cache for raw project file reads.
//!
//! Project summaries and relevant-file scans read the same files turn after
//! turn. Contents are cached by canonical path; the entry touched longest
//! ago is evicted when the cache is full.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of cached files.
pub const DEFAULT_FILE_CACHE_ENTRIES: usize = 128;

#[derive(Debug, Clone)]
struct CacheEntry {
    content: Arc<str>,
    last_used: u64,
}

/// LRU cache of file contents keyed by path.
#[derive(Debug)]
pub struct FileCache {
    entries: HashMap<PathBuf, CacheEntry>,
    max_entries: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl FileCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a file, marking it as most recently used.
    pub fn get(&mut self, path: &Path) -> Option<Arc<str>> {
        self.clock += 1;
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.last_used = self.clock;
                self.hits += 1;
                Some(Arc::clone(&entry.content))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store file contents, evicting the least recently used entry if full.
    pub fn put(&mut self, path: PathBuf, content: impl Into<Arc<str>>) -> Arc<str> {
        self.clock += 1;
        if !self.entries.contains_key(&path) && self.entries.len() >= self.max_entries {
            self.evict_least_recent();
        }
        let content = content.into();
        self.entries.insert(
            path,
            CacheEntry {
                content: Arc::clone(&content),
                last_used: self.clock,
            },
        );
        content
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn evict_least_recent(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_CACHE_ENTRIES)
    }
}
