//! Changelog data model and its JSON persistence.

use crate::error::StorageError;
use crate::types::{now_millis, ChangeType, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFile {
    /// Forward-slash path relative to the changelog's directory.
    pub path: String,
    pub action: ChangeType,
}

/// An immutable changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub author: String,
    pub datetime: DateTime<Utc>,
    pub message: String,
    pub files: Vec<CommitFile>,
}

impl Commit {
    /// New commit with a fresh UUID and the current time.
    pub fn new(
        author: impl Into<String>,
        message: impl Into<String>,
        files: Vec<CommitFile>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            datetime: Utc::now(),
            message: message.into(),
            files,
        }
    }

    pub fn touches(&self, relative_path: &str) -> bool {
        self.files.iter().any(|f| f.path == relative_path)
    }
}

/// The persisted shape of `.changelog.json`: the live fragment only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogFile {
    pub created: Timestamp,
    pub directory: PathBuf,
    pub modified: Timestamp,
    pub log: Vec<Commit>,
}

impl ChangelogFile {
    pub fn empty(directory: &Path) -> Self {
        let now = now_millis();
        Self {
            created: now,
            directory: directory.to_path_buf(),
            modified: now,
            log: Vec::new(),
        }
    }

    /// Read and parse. Missing files are `NotFound`, bad JSON is `SerializationError`.
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::IoError(e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write via a sibling temp file and rename, so readers never see a torn file.
    pub fn write_atomic(&self, path: &Path) -> Result<(), StorageError> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
        fs::create_dir_all(parent)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(
            ".{}.{}.tmp",
            file_name.trim_start_matches('.'),
            uuid::Uuid::new_v4().simple()
        ));

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Commits grouped by the snapshot they belong to; `snapshot_path == None` is the live bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCommitBundle {
    pub snapshot_path: Option<PathBuf>,
    pub modified: Timestamp,
    pub commits: Vec<Commit>,
}

impl SnapshotCommitBundle {
    pub fn is_live(&self) -> bool {
        self.snapshot_path.is_none()
    }
}
