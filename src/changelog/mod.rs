//! Changelog
//!
//! Append-only commit history for one shared directory. The live fragment lives
//! in `<root>/.changelog.json`; every snapshot carries a frozen fragment. The
//! merged view is rebuilt from disk on each refresh, so disk stays the single
//! source of truth and the in-memory log is a cache.
//!
//! Concurrent appends from separate processes are not coordinated: the last
//! writer wins and may drop the other's commit. Each write is atomic (temp file
//! plus rename), so readers never see a torn file.

pub mod model;

pub use model::{ChangelogFile, Commit, CommitFile, SnapshotCommitBundle};

use crate::error::{ApiError, StorageError};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::tree::path::{absolutize, changelog_path, key_from_relative, relative_key, USERS_DIR};
use crate::types::{now_millis, Timestamp};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Merged live + historical changelog for one directory.
#[derive(Debug, Default)]
pub struct Changelog {
    directory: Option<PathBuf>,
    created: Timestamp,
    modified: Timestamp,
    log: Vec<SnapshotCommitBundle>,
    snapshots: SnapshotStore,
    last_error: Option<String>,
}

impl Changelog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.directory.is_some()
    }

    pub fn directory(&self) -> Result<&Path, ApiError> {
        self.directory.as_deref().ok_or(ApiError::DirectoryNotSet)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Point at a new directory and load its history.
    pub fn set_directory(&mut self, path: &Path) -> Result<(), ApiError> {
        let directory = absolutize(path)?;
        if !directory.is_dir() {
            return Err(StorageError::NotFound(directory).into());
        }
        self.directory = Some(directory);
        self.log.clear();
        self.refresh()
    }

    /// Rebuild the merged log from disk.
    ///
    /// A missing or malformed `.changelog.json` is replaced by an empty one.
    /// Snapshots without a readable changelog are skipped.
    pub fn refresh(&mut self) -> Result<(), ApiError> {
        let directory = self.directory()?.to_path_buf();
        let live = load_or_recreate(&directory)?;

        let mut log: Vec<SnapshotCommitBundle> = self
            .snapshots
            .list(&directory)
            .into_iter()
            .filter_map(|snapshot| match snapshot.changelog() {
                Ok(frozen) => Some(SnapshotCommitBundle {
                    snapshot_path: Some(snapshot.path),
                    modified: frozen.modified,
                    commits: frozen.log,
                }),
                Err(e) => {
                    warn!(snapshot = %snapshot.id, error = %e, "Skipping unreadable snapshot");
                    None
                }
            })
            .collect();

        log.push(SnapshotCommitBundle {
            snapshot_path: None,
            modified: live.modified,
            commits: live.log,
        });

        debug!(
            directory = %directory.display(),
            bundles = log.len(),
            modified = live.modified,
            "Refreshed changelog"
        );
        self.created = live.created;
        self.modified = live.modified;
        self.log = log;
        Ok(())
    }

    /// Append a commit to the live fragment.
    ///
    /// Returns `Ok(false)` when the commit could not be persisted (I/O failure or a
    /// duplicate id); nothing is written in that case. `DirectoryNotSet` is an error.
    pub fn append_commit(&mut self, commit: Commit) -> Result<bool, ApiError> {
        let directory = self.directory()?.to_path_buf();
        if let Err(e) = self.refresh() {
            return self.append_failed(e.to_string());
        }

        if self
            .log
            .iter()
            .flat_map(|b| b.commits.iter())
            .any(|c| c.id == commit.id)
        {
            return self.append_failed(format!("Duplicate commit id {}", commit.id));
        }

        let live_commits = self
            .log
            .iter()
            .find(|b| b.is_live())
            .map(|b| b.commits.clone());
        let Some(mut commits) = live_commits else {
            return self.append_failed("Live changelog bundle missing".to_string());
        };

        commits.push(commit.clone());
        let updated = ChangelogFile {
            created: self.created,
            directory: directory.clone(),
            modified: now_millis().max(self.modified + 1),
            log: commits,
        };

        if let Err(e) = updated.write_atomic(&changelog_path(&directory)) {
            return self.append_failed(e.to_string());
        }

        if let Some(live) = self.log.iter_mut().find(|b| b.is_live()) {
            live.commits = updated.log;
            live.modified = updated.modified;
        }
        self.modified = updated.modified;
        self.last_error = None;
        info!(
            directory = %directory.display(),
            commit = %commit.id,
            author = %commit.author,
            files = commit.files.len(),
            "Appended commit"
        );
        Ok(true)
    }

    fn append_failed(&mut self, message: String) -> Result<bool, ApiError> {
        warn!(error = %message, "Failed to append commit");
        self.last_error = Some(message);
        Ok(false)
    }

    /// Bundles holding commits that touch `path`, most recent first.
    ///
    /// `path` may be relative to the directory, absolute under it, or a path
    /// inside a user copy. Bundles with no matching commit are omitted.
    pub fn get_changes_for_file(
        &self,
        path: &Path,
    ) -> Result<Vec<SnapshotCommitBundle>, ApiError> {
        let key = self.file_key(path)?;
        let filtered = self.log.iter().filter_map(|bundle| {
            let commits: Vec<Commit> = bundle
                .commits
                .iter()
                .filter(|c| c.touches(&key))
                .cloned()
                .collect();
            (!commits.is_empty()).then(|| SnapshotCommitBundle {
                snapshot_path: bundle.snapshot_path.clone(),
                modified: bundle.modified,
                commits,
            })
        });
        Ok(order_bundles(filtered))
    }

    /// Every bundle, most recent first.
    pub fn get_all_changes(&self) -> Result<Vec<SnapshotCommitBundle>, ApiError> {
        self.directory()?;
        Ok(order_bundles(self.log.iter().cloned()))
    }

    /// `modified` of the live fragment.
    pub fn modified_timestamp(&self) -> Result<Timestamp, ApiError> {
        self.directory()?;
        Ok(self.modified)
    }

    /// Number of commits in the live fragment.
    pub fn live_commit_count(&self) -> usize {
        self.log
            .iter()
            .find(|b| b.is_live())
            .map(|b| b.commits.len())
            .unwrap_or(0)
    }

    /// Freeze the shared directory and live fragment into a snapshot, then start
    /// a new empty live fragment.
    ///
    /// If the live fragment cannot be reset the new snapshot is withdrawn, so a
    /// commit is never visible in two bundles.
    pub fn create_snapshot(&mut self, user: &str) -> Result<Snapshot, ApiError> {
        self.create_snapshot_with(user, |fresh, path| fresh.write_atomic(path))
    }

    fn create_snapshot_with<F>(&mut self, user: &str, reset: F) -> Result<Snapshot, ApiError>
    where
        F: FnOnce(&ChangelogFile, &Path) -> Result<(), StorageError>,
    {
        let directory = self.directory()?.to_path_buf();
        self.refresh()?;
        let snapshot = self.snapshots.create(&directory, user)?;

        let fresh = ChangelogFile {
            created: self.created,
            directory: directory.clone(),
            modified: now_millis().max(snapshot.modified + 1),
            log: Vec::new(),
        };
        if let Err(e) = reset(&fresh, &changelog_path(&directory)) {
            warn!(snapshot = %snapshot.id, error = %e, "Live changelog reset failed");
            if let Err(cleanup) = self.snapshots.discard(&snapshot) {
                warn!(snapshot = %snapshot.id, error = %cleanup, "Could not discard snapshot");
            }
            self.refresh()?;
            return Err(e.into());
        }
        self.refresh()?;
        Ok(snapshot)
    }

    pub fn snapshots(&self) -> Result<Vec<Snapshot>, ApiError> {
        Ok(self.snapshots.list(self.directory()?))
    }

    /// Key used in commit file lists for `path`.
    fn file_key(&self, path: &Path) -> Result<String, ApiError> {
        let directory = self.directory()?;
        let key = if path.is_absolute() {
            relative_key(directory, path).ok_or_else(|| ApiError::PathOutsideRoot {
                path: path.to_path_buf(),
                root: directory.to_path_buf(),
            })?
        } else {
            key_from_relative(path)
        };
        Ok(strip_user_prefix(&key).to_string())
    }
}

/// `.users/<name>/a/b.yml` -> `a/b.yml`; other keys unchanged.
fn strip_user_prefix(key: &str) -> &str {
    match key.strip_prefix(USERS_DIR).and_then(|r| r.strip_prefix('/')) {
        Some(rest) => rest.split_once('/').map(|(_, tail)| tail).unwrap_or(""),
        None => key,
    }
}

/// Commits newest-first within a bundle, bundles by `modified` descending (stable).
fn order_bundles(
    bundles: impl Iterator<Item = SnapshotCommitBundle>,
) -> Vec<SnapshotCommitBundle> {
    let mut out: Vec<SnapshotCommitBundle> = bundles
        .map(|mut bundle| {
            bundle.commits.reverse();
            bundle
        })
        .collect();
    out.sort_by(|a, b| b.modified.cmp(&a.modified));
    out
}

/// Read the live fragment, recreating it when missing or malformed.
fn load_or_recreate(directory: &Path) -> Result<ChangelogFile, StorageError> {
    let path = changelog_path(directory);
    match ChangelogFile::read(&path) {
        Ok(live) => Ok(live),
        Err(e @ (StorageError::NotFound(_) | StorageError::SerializationError(_))) => {
            info!(path = %path.display(), reason = %e, "Creating empty changelog");
            let fresh = ChangelogFile::empty(directory);
            fresh.write_atomic(&path)?;
            Ok(fresh)
        }
        Err(e) => Err(e),
    }
}
