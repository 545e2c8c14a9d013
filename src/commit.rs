//! Commit workflow
//!
//! Publishes a user's private changes to the shared directory:
//! detect (three-way) -> snapshot the pre-commit shared state -> apply the
//! user's files -> append a commit to the new live changelog -> record the
//! published digests in the user's sync state.
//!
//! Conflicting paths (`Origin::Both`) are skipped unless the request forces them.
//! Changes that originate only in the shared directory are never applied. If
//! applying or recording fails, the touched paths are restored from the
//! pre-commit snapshot.

use crate::changelog::{Changelog, Commit, CommitFile};
use crate::detector::FileChangeDetector;
use crate::error::{ApiError, StorageError};
use crate::files::{baseline_snapshot, read_sync_state, write_sync_state, SyncState};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::tree::copy::copy_file;
use crate::tree::hasher::file_digest;
use crate::tree::path::user_dir;
use crate::types::{now_millis, ChangeType, FileChange, Origin};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// What to commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub user: String,
    pub message: String,
    /// Restrict to these relative paths; `None` commits every user change.
    #[serde(default)]
    pub files: Option<Vec<String>>,
    /// Also publish conflicting paths, overwriting the shared version.
    #[serde(default)]
    pub force: bool,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub commit: Commit,
    /// Snapshot of the shared directory as it was before this commit.
    pub snapshot: Snapshot,
    pub skipped_conflicts: Vec<FileChange>,
}

/// Run the commit workflow for `request.user` against the changelog's directory.
///
/// Returns `UnresolvedConflicts` when every selected change is a conflict and
/// `NothingToCommit` when there is nothing selected at all.
pub fn commit_user_changes(
    changelog: &mut Changelog,
    detector: &FileChangeDetector,
    request: &CommitRequest,
) -> Result<CommitOutcome, ApiError> {
    let directory = changelog.directory()?.to_path_buf();
    if request.user.is_empty() {
        return Err(ApiError::UserNotSet);
    }
    let user_root = user_dir(&directory, &request.user);

    let wanted = |change: &FileChange| match &request.files {
        Some(files) => files.iter().any(|f| f == &change.relative_path),
        None => true,
    };

    let mut selected = Vec::new();
    let mut skipped_conflicts = Vec::new();
    for change in detector.detect_for_user(&directory, &request.user)? {
        if !wanted(&change) {
            continue;
        }
        match change.origin {
            Origin::User => selected.push(change),
            Origin::Both if request.force => selected.push(change),
            Origin::Both => skipped_conflicts.push(change),
            Origin::Main => {}
        }
    }

    if !skipped_conflicts.is_empty() {
        warn!(
            user = %request.user,
            conflicts = skipped_conflicts.len(),
            "Skipped conflicting files"
        );
    }
    if selected.is_empty() {
        if skipped_conflicts.is_empty() {
            return Err(ApiError::NothingToCommit);
        }
        return Err(ApiError::UnresolvedConflicts(skipped_conflicts));
    }

    // The baseline detection ran against, recorded if the user has none yet.
    let detected_baseline = baseline_snapshot(&SnapshotStore::new(), &directory, &user_root);
    let snapshot = changelog.create_snapshot(&request.user)?;

    let mut touched: Vec<&str> = Vec::with_capacity(selected.len());
    for change in &selected {
        touched.push(&change.relative_path);
        if let Err(e) = apply_change(&directory, &user_root, change) {
            restore_paths(&directory, &snapshot, &touched);
            return Err(e.into());
        }
    }

    let commit = Commit::new(
        request.user.clone(),
        request.message.clone(),
        selected
            .iter()
            .map(|c| CommitFile {
                path: c.relative_path.clone(),
                action: c.change_type,
            })
            .collect(),
    );

    let appended = changelog.append_commit(commit.clone());
    if !matches!(appended, Ok(true)) {
        restore_paths(&directory, &snapshot, &touched);
        appended?;
        let reason = changelog
            .last_error()
            .unwrap_or("changelog write failed")
            .to_string();
        return Err(ApiError::CommitFailed(reason));
    }

    let baseline_id = detected_baseline.unwrap_or_else(|| snapshot.clone()).id;
    if let Err(e) = record_published(&directory, &user_root, baseline_id, &selected) {
        warn!(user = %request.user, error = %e, "Could not record published files");
    }

    info!(
        user = %request.user,
        commit = %commit.id,
        files = commit.files.len(),
        snapshot = %snapshot.id,
        "Committed user changes"
    );

    Ok(CommitOutcome {
        commit,
        snapshot,
        skipped_conflicts,
    })
}

/// Remember the digest each selected path was published at.
fn record_published(
    shared_root: &Path,
    user_root: &Path,
    baseline_id: String,
    published: &[FileChange],
) -> Result<(), StorageError> {
    let mut state =
        read_sync_state(user_root).unwrap_or_else(|| SyncState::new(Some(baseline_id)));
    for change in published {
        let digest = match change.change_type {
            ChangeType::Deleted => None,
            ChangeType::Added | ChangeType::Modified => {
                Some(file_digest(&shared_root.join(&change.relative_path))?)
            }
        };
        state.committed.insert(change.relative_path.clone(), digest);
    }
    state.synced = now_millis();
    write_sync_state(user_root, &state)
}

/// Make the shared copy of one path match the user's copy.
fn apply_change(
    shared_root: &Path,
    user_root: &Path,
    change: &FileChange,
) -> Result<(), StorageError> {
    let target = shared_root.join(&change.relative_path);
    match change.change_type {
        ChangeType::Added | ChangeType::Modified => {
            copy_file(&user_root.join(&change.relative_path), &target)
        }
        ChangeType::Deleted => remove_if_present(&target),
    }
}

/// Put `paths` back the way `snapshot` recorded them.
fn restore_paths(shared_root: &Path, snapshot: &Snapshot, paths: &[&str]) {
    for relative in paths {
        let original = snapshot.path.join(relative);
        let target = shared_root.join(relative);
        let restored = if original.is_file() {
            copy_file(&original, &target)
        } else if target.is_file() {
            remove_if_present(&target)
        } else {
            Ok(())
        };
        if let Err(e) = restored {
            error!(path = %relative, snapshot = %snapshot.id, error = %e, "Failed to restore file");
        }
    }
    warn!(files = paths.len(), snapshot = %snapshot.id, "Rolled back partial commit");
}

fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
