//! File Manager
//!
//! Maps paths in the shared directory onto the current user's private copy under
//! `<root>/.users/<username>/`. Reads prefer the private copy once it exists and
//! fall back to the shared original; writes always land in the private copy.
//!
//! Filesystem failures during read/write are captured (`last_error`, `success:
//! false`) instead of returned, so polling callers survive transient I/O errors.
//! Sequencing mistakes (no directory, no user, path outside the root) are errors.

use crate::changelog::Changelog;
use crate::error::{ApiError, StorageError};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::tree::copy::{copy_tree, is_tracked_empty};
use crate::tree::path::{
    absolutize, has_dot_segment, normalize_path, user_dir, SYNC_STATE_FILE,
};
use crate::tree::{hash_path, HashMode};
use crate::types::{now_millis, ContentHash, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rewrite a path under `shared_root` to the same relative path under `user_root`.
///
/// Paths already inside `user_root` are returned unchanged. Anything outside
/// `shared_root` is rejected, as are bookkeeping (dot) paths.
pub fn map_to_user_path(
    shared_root: &Path,
    user_root: &Path,
    absolute_path: &Path,
) -> Result<PathBuf, ApiError> {
    let path = normalize_path(absolute_path);
    let shared_root = normalize_path(shared_root);
    let user_root = normalize_path(user_root);

    if path.starts_with(&user_root) {
        return Ok(path);
    }

    let relative = path
        .strip_prefix(&shared_root)
        .map_err(|_| ApiError::PathOutsideRoot {
            path: path.clone(),
            root: shared_root.clone(),
        })?;

    if has_dot_segment(relative) {
        return Err(StorageError::InvalidPath(format!(
            "{} is a bookkeeping path",
            path.display()
        ))
        .into());
    }

    Ok(user_root.join(relative))
}

/// Usernames become directory names under `.users/`.
pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() || username.starts_with('.') || username.contains(['/', '\\']) {
        return Err(ApiError::ConfigError(format!(
            "Invalid username: {:?}",
            username
        )));
    }
    Ok(())
}

/// Per-user sync bookkeeping stored at `<user dir>/.sync.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Id of the snapshot the user copy was last synchronized with.
    pub baseline_snapshot: Option<String>,
    pub synced: Timestamp,
    /// Paths this user published after the baseline snapshot, with the content
    /// digest they were published at (`None` for a deletion). They override the
    /// snapshot as the user's baseline for those paths.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub committed: BTreeMap<String, Option<ContentHash>>,
}

impl SyncState {
    pub fn new(baseline_snapshot: Option<String>) -> Self {
        Self {
            baseline_snapshot,
            synced: now_millis(),
            committed: BTreeMap::new(),
        }
    }
}

pub fn read_sync_state(user_directory: &Path) -> Option<SyncState> {
    let content = fs::read_to_string(user_directory.join(SYNC_STATE_FILE)).ok()?;
    match serde_json::from_str(&content) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(user_dir = %user_directory.display(), error = %e, "Ignoring malformed sync state");
            None
        }
    }
}

pub fn write_sync_state(user_directory: &Path, state: &SyncState) -> Result<(), StorageError> {
    fs::create_dir_all(user_directory)?;
    let json = serde_json::to_string_pretty(state)?;
    fs::write(user_directory.join(SYNC_STATE_FILE), json)?;
    Ok(())
}

/// Baseline snapshot of a user copy: the recorded one if it still exists, else the latest.
pub fn baseline_snapshot(
    snapshots: &SnapshotStore,
    shared_root: &Path,
    user_directory: &Path,
) -> Option<Snapshot> {
    let recorded = read_sync_state(user_directory)
        .and_then(|s| s.baseline_snapshot)
        .and_then(|id| snapshots.get(shared_root, &id));
    recorded.or_else(|| snapshots.latest(shared_root))
}

/// True when the tracked contents of `snapshot` equal the shared directory's.
fn matches_shared(shared_root: &Path, snapshot: &Snapshot) -> Result<bool, StorageError> {
    let shared = hash_path(shared_root, HashMode::Contents)?;
    Ok(shared == hash_path(&snapshot.path, HashMode::Contents)?)
}

/// Result of `FileManager::read_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReadResult {
    pub success: bool,
    pub content: Option<String>,
    pub resolved_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `FileManager::write_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileWriteResult {
    pub success: bool,
    pub resolved_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reads and writes through the current user's private copy.
#[derive(Debug, Default)]
pub struct FileManager {
    user: Option<String>,
    directory: Option<PathBuf>,
    last_error: Option<String>,
    snapshots: SnapshotStore,
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user(&mut self, username: &str) -> Result<(), ApiError> {
        validate_username(username)?;
        self.user = Some(username.to_string());
        if self.directory.is_some() {
            self.ensure_user_directory()?;
        }
        Ok(())
    }

    /// Select the shared directory; creates the user's private directory if a user is set.
    pub fn set_current_directory(&mut self, path: &Path) -> Result<(), ApiError> {
        let directory = absolutize(path)?;
        if !directory.is_dir() {
            return Err(StorageError::NotFound(directory).into());
        }
        debug!(directory = %directory.display(), "Current directory set");
        self.directory = Some(directory);
        if self.user.is_some() {
            self.ensure_user_directory()?;
        }
        Ok(())
    }

    pub fn current_directory(&self) -> Result<&Path, ApiError> {
        self.directory.as_deref().ok_or(ApiError::DirectoryNotSet)
    }

    pub fn user(&self) -> Result<&str, ApiError> {
        self.user.as_deref().ok_or(ApiError::UserNotSet)
    }

    pub fn user_directory(&self) -> Result<PathBuf, ApiError> {
        Ok(user_dir(self.current_directory()?, self.user()?))
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn ensure_user_directory(&mut self) -> Result<PathBuf, ApiError> {
        let dir = self.user_directory()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(user_dir = %dir.display(), "Created user directory");
        }
        Ok(dir)
    }

    /// Absolute shared-side path for `path`; relative paths are taken from the shared root.
    fn shared_path(&self, path: &Path) -> Result<PathBuf, ApiError> {
        let root = self.current_directory()?;
        Ok(if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&root.join(path))
        })
    }

    /// The user-copy path that `path` maps to.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, ApiError> {
        let shared = self.shared_path(path)?;
        map_to_user_path(self.current_directory()?, &self.user_directory()?, &shared)
    }

    /// Read through the private copy, falling back to the shared original.
    pub fn read_file(&mut self, path: &Path) -> Result<FileReadResult, ApiError> {
        let shared = self.shared_path(path)?;
        let private = self.resolve(path)?;
        let resolved = if private.exists() { private } else { shared };

        match fs::read_to_string(&resolved) {
            Ok(content) => {
                self.last_error = None;
                Ok(FileReadResult {
                    success: true,
                    content: Some(content),
                    resolved_path: resolved,
                    error: None,
                })
            }
            Err(e) => {
                let message = format!("Failed to read {}: {}", resolved.display(), e);
                warn!(path = %resolved.display(), error = %e, "File read failed");
                self.last_error = Some(message.clone());
                Ok(FileReadResult {
                    success: false,
                    content: None,
                    resolved_path: resolved,
                    error: Some(message),
                })
            }
        }
    }

    /// Write into the private copy, creating parent directories as needed.
    pub fn write_file(&mut self, path: &Path, content: &str) -> Result<FileWriteResult, ApiError> {
        let resolved = self.resolve(path)?;
        let result = resolved
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .and_then(|_| fs::write(&resolved, content));

        match result {
            Ok(()) => {
                self.last_error = None;
                debug!(path = %resolved.display(), bytes = content.len(), "Wrote user file");
                Ok(FileWriteResult {
                    success: true,
                    resolved_path: resolved,
                    error: None,
                })
            }
            Err(e) => {
                let message = format!("Failed to write {}: {}", resolved.display(), e);
                warn!(path = %resolved.display(), error = %e, "File write failed");
                self.last_error = Some(message.clone());
                Ok(FileWriteResult {
                    success: false,
                    resolved_path: resolved,
                    error: Some(message),
                })
            }
        }
    }

    /// Populate an empty user copy from the shared directory.
    ///
    /// Records as the user's baseline a snapshot whose contents match the shared
    /// directory: the latest one when it is current, otherwise a freshly folded
    /// one. Returns `false` if the user copy already had tracked content.
    pub fn initialize_user_copy(&mut self) -> Result<bool, ApiError> {
        let root = self.current_directory()?.to_path_buf();
        let user = self.user()?.to_string();
        let dir = self.ensure_user_directory()?;
        if !is_tracked_empty(&dir)? {
            return Ok(false);
        }

        let current = match self.snapshots.latest(&root) {
            Some(snapshot) if matches_shared(&root, &snapshot)? => Some(snapshot),
            _ => None,
        };
        let baseline = match current {
            Some(snapshot) => snapshot,
            None => {
                // Fold through the changelog so live commits are not duplicated.
                let mut changelog = Changelog::new();
                changelog.set_directory(&root)?;
                changelog.create_snapshot(&user)?
            }
        };
        let copied = copy_tree(&root, &dir)?;
        write_sync_state(&dir, &SyncState::new(Some(baseline.id.clone())))?;
        info!(user = %user, files = copied, baseline = %baseline.id, "Initialized user copy");
        Ok(true)
    }

    pub fn sync_state(&self) -> Result<Option<SyncState>, ApiError> {
        Ok(read_sync_state(&self.user_directory()?))
    }

    pub fn baseline_snapshot(&self) -> Result<Option<Snapshot>, ApiError> {
        Ok(baseline_snapshot(
            &self.snapshots,
            self.current_directory()?,
            &self.user_directory()?,
        ))
    }
}
