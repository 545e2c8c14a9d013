//! Snapshot Store
//!
//! A snapshot is a frozen copy of a shared directory's tracked contents under
//! `<root>/.snapshots/<id>/`, together with the live changelog as it was at that
//! instant (`<id>/.changelog.json`). Snapshots are assembled under a dot-prefixed
//! staging name and renamed into place, so a listed snapshot is always complete.
//! Nothing here ever writes into an existing snapshot.
//!
//! Snapshot ids are `<13-digit epoch millis>-<8 hex>-<author>`: they sort
//! chronologically and carry their author.

use crate::changelog::model::ChangelogFile;
use crate::error::StorageError;
use crate::tree::copy::copy_tree;
use crate::tree::path::{changelog_path, is_dot_name, snapshots_dir, CHANGELOG_FILE};
use crate::types::{now_millis, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A complete, immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub path: PathBuf,
    /// `modified` of the frozen changelog.
    pub modified: Timestamp,
    pub author: String,
    /// Creation time decoded from the id.
    pub created: Timestamp,
}

impl Snapshot {
    /// The frozen changelog embedded in this snapshot.
    pub fn changelog(&self) -> Result<ChangelogFile, StorageError> {
        ChangelogFile::read(&self.path.join(CHANGELOG_FILE))
    }
}

/// Decoded snapshot id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotId {
    pub created: Timestamp,
    pub suffix: String,
    pub author: String,
}

impl SnapshotId {
    pub fn new(created: Timestamp, author: &str) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            created,
            suffix,
            author: sanitize_author(author),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(3, '-');
        let millis = parts.next()?;
        let suffix = parts.next()?;
        let author = parts.next()?;
        if millis.len() != 13 || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if suffix.len() != 8 || !suffix.bytes().all(|b| b.is_ascii_hexdigit()) || author.is_empty()
        {
            return None;
        }
        Some(Self {
            created: millis.parse().ok()?,
            suffix: suffix.to_string(),
            author: author.to_string(),
        })
    }

    pub fn as_name(&self) -> String {
        format!("{:013}-{}-{}", self.created, self.suffix, self.author)
    }
}

fn sanitize_author(author: &str) -> String {
    let cleaned: String = author
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Creates and enumerates snapshots of shared directories.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore;

impl SnapshotStore {
    pub fn new() -> Self {
        Self
    }

    /// True if at least one complete snapshot authored by `user` exists.
    pub fn exists(&self, directory: &Path, user: &str) -> bool {
        let author = sanitize_author(user);
        self.list(directory).iter().any(|s| s.author == author)
    }

    /// Freeze the shared directory and its current live changelog into a new snapshot.
    ///
    /// A missing or malformed live changelog is frozen as an empty one. The live
    /// log is not reset here; `Changelog::create_snapshot` does the fold.
    pub(crate) fn create(&self, directory: &Path, user: &str) -> Result<Snapshot, StorageError> {
        let live = match ChangelogFile::read(&changelog_path(directory)) {
            Ok(log) => log,
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "Freezing empty changelog");
                ChangelogFile::empty(directory)
            }
        };

        let root = snapshots_dir(directory);
        fs::create_dir_all(&root)?;

        // Ids must sort after every existing snapshot even within one millisecond.
        let latest = self.latest(directory).map(|s| s.created).unwrap_or(0);
        let id = SnapshotId::new(now_millis().max(latest + 1), user);
        let name = id.as_name();

        let staging = root.join(format!(".staging-{}", name));
        let result = copy_tree(directory, &staging)
            .and_then(|_| live.write_atomic(&staging.join(CHANGELOG_FILE)))
            .and_then(|_| fs::rename(&staging, root.join(&name)).map_err(StorageError::from));
        if let Err(e) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let snapshot = Snapshot {
            id: name,
            path: root.join(id.as_name()),
            modified: live.modified,
            author: id.author,
            created: id.created,
        };
        info!(
            directory = %directory.display(),
            snapshot = %snapshot.id,
            commits = live.log.len(),
            "Created snapshot"
        );
        Ok(snapshot)
    }

    /// Withdraw a snapshot that must not be published.
    ///
    /// The directory is first renamed to a dot name so `list` stops seeing it
    /// even if the removal is interrupted.
    pub(crate) fn discard(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let Some(root) = snapshot.path.parent() else {
            return Err(StorageError::InvalidPath(snapshot.path.display().to_string()));
        };
        let doomed = root.join(format!(".discard-{}", snapshot.id));
        fs::rename(&snapshot.path, &doomed)?;
        fs::remove_dir_all(&doomed)?;
        warn!(snapshot = %snapshot.id, "Discarded snapshot");
        Ok(())
    }

    /// All complete snapshots, oldest first.
    ///
    /// Entries without a readable changelog or with an unrecognised name are skipped.
    pub fn list(&self, directory: &Path) -> Vec<Snapshot> {
        let root = snapshots_dir(directory);
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            if is_dot_name(&name) || !entry.path().is_dir() {
                continue;
            }
            let name = name.to_string_lossy().into_owned();
            let Some(id) = SnapshotId::parse(&name) else {
                warn!(snapshot = %name, "Skipping snapshot with unrecognised name");
                continue;
            };
            let path = entry.path();
            match ChangelogFile::read(&path.join(CHANGELOG_FILE)) {
                Ok(log) => snapshots.push(Snapshot {
                    id: name,
                    path,
                    modified: log.modified,
                    author: id.author,
                    created: id.created,
                }),
                Err(e) => {
                    warn!(snapshot = %name, error = %e, "Skipping incomplete snapshot");
                }
            }
        }

        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    pub fn latest(&self, directory: &Path) -> Option<Snapshot> {
        self.list(directory).pop()
    }

    pub fn get(&self, directory: &Path, id: &str) -> Option<Snapshot> {
        self.list(directory).into_iter().find(|s| s.id == id)
    }
}
