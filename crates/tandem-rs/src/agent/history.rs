//! Saving and loading conversation history as JSON files.
//!
//! Files are named `history_YYYYMMDD_HHMMSS.json` and hold a pretty-printed
//! array of `{role, content, created_at}` objects.

use crate::Message;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Why history could not be saved or loaded.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Write `messages` to a new timestamped file in `dir`, creating the
/// directory if needed. Returns the file path.
pub fn save_history(dir: impl AsRef<Path>, messages: &[Message]) -> Result<PathBuf, HistoryError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|source| HistoryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(format!("history_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
    let json = serde_json::to_string_pretty(messages).map_err(|source| HistoryError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| HistoryError::Io {
        path: path.clone(),
        source,
    })?;

    info!("Saved {} message(s) to {}", messages.len(), path.display());
    Ok(path)
}

/// Read a history file written by [`save_history`].
pub fn load_history(path: impl AsRef<Path>) -> Result<Vec<Message>, HistoryError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let messages: Vec<Message> = serde_json::from_str(&raw).map_err(|source| HistoryError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} message(s) from {}", messages.len(), path.display());
    Ok(messages)
}
