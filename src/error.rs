//! Error types for the sync core.
//!
//! `StorageError` covers everything that touches the disk. `ApiError` is what
//! callers of the public operations see: configuration/sequencing mistakes plus
//! wrapped storage failures.

use crate::types::FileChange;
use std::path::PathBuf;
use thiserror::Error;

/// Filesystem and persistence failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Directory walk failed: {0}")]
    WalkError(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<walkdir::Error> for StorageError {
    fn from(err: walkdir::Error) -> Self {
        match err.path() {
            Some(path) if err.io_error().map(|e| e.kind()) == Some(std::io::ErrorKind::NotFound) => {
                StorageError::NotFound(path.to_path_buf())
            }
            _ => StorageError::WalkError(err.to_string()),
        }
    }
}

/// Errors returned by the public operations of the sync core.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No directory set; call set_directory first")]
    DirectoryNotSet,

    #[error("No user set; call set_user first")]
    UserNotSet,

    #[error("Path {path} is outside shared directory {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Nothing to commit")]
    NothingToCommit,

    /// Every selected change conflicts with the shared directory.
    #[error("Nothing to commit: {} conflicting file(s) need resolving", .0.len())]
    UnresolvedConflicts(Vec<FileChange>),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Watcher error: {0}")]
    WatcherError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::StorageError(StorageError::IoError(err))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
