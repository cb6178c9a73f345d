//! Project context: a compact description of the working directory and
//! query-relevant file excerpts.
//!
//! [`ProjectContext::summary`] renders the directory tree, README and the
//! main manifest files into a character budget handed out by the
//! [`BudgetPlanner`](super::budget::BudgetPlanner).
//! [`ProjectContext::relevant_files`] searches for files whose name or
//! content mentions keywords from the user's query. Raw file reads go
//! through an LRU [`FileCache`].

use super::compactor::compact;
use super::file_cache::FileCache;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Directory and file names never shown or searched.
pub const IGNORED_NAMES: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    ".pytest_cache",
    ".mypy_cache",
    "dist",
    "build",
    ".DS_Store",
    "history",
];

/// Largest file [`ProjectContext::read_file`] will load.
pub const MAX_READ_BYTES: u64 = 50_000;

/// Files above this size are skipped by the relevance search.
pub const MAX_SCAN_BYTES: u64 = 100 * 1024;

/// Deepest directory level the relevance search visits.
pub const MAX_SCAN_DEPTH: usize = 5;

/// Below this budget the summary contains the directory tree only.
pub const STRUCTURE_ONLY_BELOW_CHARS: usize = 1500;

const README_NAMES: &[&str] = &["README.md", "README.rst", "README.txt", "README"];

const CONFIG_FILE_NAMES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "setup.py",
    "go.mod",
    "Makefile",
    "Dockerfile",
    "config.toml",
    "config.yaml",
];

const SEARCHABLE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs", "rb",
    "php", "swift", "sh", "toml", "yaml", "yml", "json", "md", "txt", "html", "css", "sql",
];

/// Errors from reading files inside the project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("path escapes the project root: {0}")]
    OutsideRoot(PathBuf),
    #[error("file too large ({size} bytes, limit {limit}): {path}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file excerpt selected for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSnippet {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    /// Possibly compacted content.
    pub content: String,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Read-only view of a project directory.
#[derive(Debug)]
pub struct ProjectContext {
    root: PathBuf,
    cache: Mutex<FileCache>,
}

impl ProjectContext {
    /// Open a project rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|source| ProjectError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root,
            cache: Mutex::new(FileCache::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indented tree of the project, directories first.
    pub fn structure(&self, max_depth: usize, include_files: bool) -> String {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        let mut lines = vec![format!("{name}/")];
        build_tree(&self.root, "", 0, max_depth, include_files, &mut lines);
        lines.join("\n")
    }

    /// The first README found in the root, truncated to 2000 chars.
    pub fn readme(&self) -> Option<String> {
        README_NAMES.iter().find_map(|name| {
            let content = self.read_file(name).ok()?;
            Some(format!("README ({name}):\n{}", compact(&content, 2000)))
        })
    }

    /// Manifest and build files present in the root, each truncated to
    /// 1000 chars.
    pub fn config_files(&self) -> Vec<(String, String)> {
        CONFIG_FILE_NAMES
            .iter()
            .filter_map(|name| {
                let content = self.read_file(name).ok()?;
                Some((name.to_string(), compact(&content, 1000)))
            })
            .collect()
    }

    /// A description of the project that fits `max_chars`.
    pub fn summary(&self, max_chars: usize) -> String {
        if max_chars == 0 {
            return String::new();
        }
        if max_chars < STRUCTURE_ONLY_BELOW_CHARS {
            return compact(&self.structure(1, false), max_chars);
        }

        let mut parts = vec![compact(&self.structure(2, false), (max_chars / 3).min(800))];

        if let Some(readme) = self.readme() {
            parts.push(compact(&readme, (max_chars / 4).min(600)));
        }

        let configs = self.config_files();
        if !configs.is_empty() {
            let used: usize = parts.iter().map(|p| p.chars().count() + 2).sum();
            let per_file = (max_chars.saturating_sub(used) / (configs.len() + 1)).min(300);
            let mut section = String::from("Configuration files:");
            for (name, content) in configs.iter().take(2) {
                section.push_str(&format!("\n\n{name}:\n{}", compact(content, per_file)));
            }
            parts.push(section);
        }

        compact(&parts.join("\n\n"), max_chars)
    }

    /// Read a file relative to the project root through the LRU cache.
    pub fn read_file(&self, relative: &str) -> Result<Arc<str>, ProjectError> {
        self.read_limited(relative, MAX_READ_BYTES)
    }

    /// The size limit applies to cache hits too.
    fn read_limited(&self, relative: &str, limit: u64) -> Result<Arc<str>, ProjectError> {
        let path = self.resolve(relative)?;
        let io_err = |source| ProjectError::Io {
            path: path.clone(),
            source,
        };
        let meta = fs::metadata(&path).map_err(io_err)?;
        if !meta.is_file() {
            return Err(ProjectError::NotAFile(path));
        }
        if meta.len() > limit {
            return Err(ProjectError::TooLarge {
                path,
                size: meta.len(),
                limit,
            });
        }
        if let Some(hit) = self.lock_cache().get(&path) {
            return Ok(hit);
        }
        let content = fs::read_to_string(&path).map_err(io_err)?;
        Ok(self.lock_cache().put(path, content))
    }

    /// Drop all cached file contents.
    pub fn invalidate_cache(&self) {
        self.lock_cache().clear();
    }

    /// Files whose name or content mentions a keyword of `query`, visited
    /// breadth-first. Each excerpt is compacted to `max_chars_per_file`.
    pub fn relevant_files(
        &self,
        query: &str,
        max_files: usize,
        max_chars_per_file: usize,
    ) -> Vec<ProjectSnippet> {
        let keywords = extract_keywords(query);
        if keywords.is_empty() || max_files == 0 {
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut queue = VecDeque::from([(self.root.clone(), 0usize)]);
        while let Some((dir, depth)) = queue.pop_front() {
            for entry in sorted_entries(&dir) {
                if found.len() >= max_files {
                    return found;
                }
                let path = entry.path();
                let Ok(meta) = entry.metadata() else { continue };
                if meta.is_dir() {
                    if depth < MAX_SCAN_DEPTH {
                        queue.push_back((path, depth + 1));
                    }
                    continue;
                }
                if meta.len() > MAX_SCAN_BYTES {
                    continue;
                }
                if let Some(snippet) = self.match_file(&path, meta.len(), &keywords, max_chars_per_file) {
                    found.push(snippet);
                }
            }
        }
        found
    }

    fn match_file(
        &self,
        path: &Path,
        size: u64,
        keywords: &[String],
        max_chars: usize,
    ) -> Option<ProjectSnippet> {
        let relative = self.relative_display(path)?;
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let name_hit = keywords.iter().any(|k| name.contains(k.as_str()));
        let searchable = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SEARCHABLE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if !name_hit && !searchable {
            return None;
        }

        let content = match self.read_limited(&relative, MAX_SCAN_BYTES) {
            Ok(c) => c,
            Err(e) => {
                debug!("Skipping {relative}: {e}");
                return None;
            }
        };
        if !name_hit {
            let lower = content.to_lowercase();
            if !keywords.iter().any(|k| lower.contains(k.as_str())) {
                return None;
            }
        }
        Some(ProjectSnippet {
            path: relative,
            content: compact(&content, max_chars),
            size,
        })
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, ProjectError> {
        let candidate = Path::new(relative);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ProjectError::OutsideRoot(candidate.to_path_buf()));
        }
        let joined = self.root.join(candidate);
        let resolved = fs::canonicalize(&joined).map_err(|source| ProjectError::Io {
            path: joined.clone(),
            source,
        })?;
        if !resolved.starts_with(&self.root) {
            return Err(ProjectError::OutsideRoot(resolved));
        }
        Ok(resolved)
    }

    fn relative_display(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, FileCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Join snippets under per-file headings and fit them into `max_chars`.
pub fn render_snippets(snippets: &[ProjectSnippet], max_chars: usize) -> Option<String> {
    if snippets.is_empty() || max_chars == 0 {
        return None;
    }
    let body = snippets
        .iter()
        .map(|s| format!("### {}\n```\n{}\n```", s.path, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(compact(&body, max_chars))
}

/// Lower-cased words of the query longer than three characters.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in query.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')) {
        let word = word.trim_matches('.').to_lowercase();
        if word.chars().count() > 3 && !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

fn is_ignored(name: &str) -> bool {
    IGNORED_NAMES.contains(&name) || name.ends_with(".pyc") || name.ends_with(".egg-info")
}

/// Directory entries minus ignored names, directories first, then by
/// lower-cased name.
fn sorted_entries(dir: &Path) -> Vec<fs::DirEntry> {
    let Ok(read) = fs::read_dir(dir) else {
        debug!("Cannot list {}", dir.display());
        return Vec::new();
    };
    let mut entries: Vec<fs::DirEntry> = read
        .filter_map(Result::ok)
        .filter(|e| !is_ignored(&e.file_name().to_string_lossy()))
        .collect();
    entries.sort_by_key(|e| {
        let is_file = e.file_type().map(|t| !t.is_dir()).unwrap_or(true);
        (is_file, e.file_name().to_string_lossy().to_lowercase())
    });
    entries
}

fn build_tree(
    dir: &Path,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    include_files: bool,
    lines: &mut Vec<String>,
) {
    if depth >= max_depth {
        return;
    }
    let entries: Vec<fs::DirEntry> = sorted_entries(dir)
        .into_iter()
        .filter(|e| include_files || e.file_type().is_ok_and(|t| t.is_dir()))
        .collect();
    let count = entries.len();
    for (i, entry) in entries.into_iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        if is_dir {
            lines.push(format!("{prefix}{branch}{name}/"));
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            build_tree(&entry.path(), &child_prefix, depth + 1, max_depth, include_files, lines);
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            lines.push(format!("{prefix}{branch}{name} ({})", format_size(size)));
        }
    }
}

fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}
