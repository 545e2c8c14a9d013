//! File-Change Detector
//!
//! Compares trees by per-file hashes only (never by line diff). Two comparisons
//! are offered:
//!
//! - two-way: a user copy against the shared directory; every divergence is
//!   attributed to the user.
//! - three-way: the shared directory and the user copy are each compared with the
//!   user's baseline snapshot. A path changed on only one side gets that side as
//!   origin; a path changed on both sides to different results is `Origin::Both`,
//!   the conflict signal. Paths both sides changed identically are not reported.
//!
//! A user's baseline is their snapshot overlaid with the digests of the paths
//! they committed since (`SyncState::committed`), so a user's own published
//! edits never count as shared-side changes against them.

use crate::cache::HashCache;
use crate::error::StorageError;
use crate::files::{baseline_snapshot, read_sync_state};
use crate::snapshot::SnapshotStore;
use crate::tree::hasher::file_digest;
use crate::tree::path::{is_dot_name, relative_key, user_dir, users_dir};
use crate::tree::{hash_tree, scan, HashMode};
use crate::types::{ChangeType, ContentHash, FileChange, Origin, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// A hashed file inside a `TreeIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedFile {
    pub hash: ContentHash,
    pub modified: Timestamp,
}

/// Flat map from relative path to file hash for one tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeIndex {
    pub files: BTreeMap<String, IndexedFile>,
}

impl TreeIndex {
    pub fn get(&self, key: &str) -> Option<&IndexedFile> {
        self.files.get(key)
    }

    /// Classify `self` against `reference`: present only here is `Added`, present
    /// only in the reference is `Deleted`, different hashes is `Modified`.
    pub fn compare(&self, reference: &TreeIndex) -> BTreeMap<String, ChangeType> {
        let mut changes = BTreeMap::new();
        for (key, file) in &self.files {
            match reference.files.get(key) {
                None => {
                    changes.insert(key.clone(), ChangeType::Added);
                }
                Some(other) if other.hash != file.hash => {
                    changes.insert(key.clone(), ChangeType::Modified);
                }
                Some(_) => {}
            }
        }
        for key in reference.files.keys() {
            if !self.files.contains_key(key) {
                changes.insert(key.clone(), ChangeType::Deleted);
            }
        }
        changes
    }
}

/// Hash-based change detection between shared, user and baseline trees.
#[derive(Debug, Clone)]
pub struct FileChangeDetector {
    mode: HashMode,
    cache: Option<Arc<HashCache>>,
    snapshots: SnapshotStore,
}

impl Default for FileChangeDetector {
    fn default() -> Self {
        Self::new(HashMode::Contents)
    }
}

impl FileChangeDetector {
    pub fn new(mode: HashMode) -> Self {
        Self {
            mode,
            cache: None,
            snapshots: SnapshotStore::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Scan and hash every tracked file below `root`.
    pub fn index(&self, root: &Path) -> Result<TreeIndex, StorageError> {
        let tree = scan(root)?;
        let mut index = TreeIndex::default();
        for file in tree.files() {
            let Some(key) = relative_key(root, &file.path) else {
                continue;
            };
            let hash = match hash_tree(file, self.mode, self.cache.as_deref()) {
                Ok(hash) => hash,
                // Deleted between scan and hash; treat as absent.
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            index.files.insert(
                key,
                IndexedFile {
                    hash,
                    modified: file.modified_time,
                },
            );
        }
        Ok(index)
    }

    /// Two-way comparison of `side` against `reference`.
    pub fn compare_dirs(
        &self,
        side: &Path,
        reference: &Path,
    ) -> Result<BTreeMap<String, ChangeType>, StorageError> {
        Ok(self.index(side)?.compare(&self.index(reference)?))
    }

    /// Classified changes of `user_root` relative to `shared_root`.
    ///
    /// With a baseline the comparison is three-way; without one every
    /// divergence is attributed to the user.
    pub fn detect(
        &self,
        shared_root: &Path,
        user_root: &Path,
        baseline_root: Option<&Path>,
    ) -> Result<Vec<FileChange>, StorageError> {
        self.detect_with_committed(shared_root, user_root, baseline_root, &BTreeMap::new())
    }

    /// Like `detect`, with `committed` digests replacing the baseline entries of
    /// the paths the user has already published.
    pub fn detect_with_committed(
        &self,
        shared_root: &Path,
        user_root: &Path,
        baseline_root: Option<&Path>,
        committed: &BTreeMap<String, Option<ContentHash>>,
    ) -> Result<Vec<FileChange>, StorageError> {
        let mut shared = self.index(shared_root)?;
        let mut user = self.index(user_root)?;

        let Some(baseline_root) = baseline_root else {
            return Ok(user
                .compare(&shared)
                .into_iter()
                .map(|(key, change_type)| {
                    let modified = user.get(&key).map(|f| f.modified);
                    file_change(key, change_type, Origin::User, modified)
                })
                .collect());
        };

        let mut baseline = self.index(baseline_root)?;
        for (key, published) in committed {
            match published {
                Some(hash) => {
                    baseline.files.insert(
                        key.clone(),
                        IndexedFile {
                            hash: *hash,
                            modified: 0,
                        },
                    );
                }
                None => {
                    baseline.files.remove(key);
                }
            }
            // Published digests are content digests; compare those paths the same way.
            if self.mode != HashMode::Contents {
                rehash_contents(&mut shared, shared_root, key)?;
                rehash_contents(&mut user, user_root, key)?;
            }
        }

        let main_changes = shared.compare(&baseline);
        let user_changes = user.compare(&baseline);
        Ok(classify(&shared, &user, &main_changes, &user_changes))
    }

    /// Changes of one user's copy, three-way against that user's baseline snapshot
    /// and the paths the user has committed since.
    pub fn detect_for_user(
        &self,
        shared_root: &Path,
        username: &str,
    ) -> Result<Vec<FileChange>, StorageError> {
        let user_root = user_dir(shared_root, username);
        if !user_root.is_dir() {
            return Err(StorageError::NotFound(user_root));
        }
        let baseline = baseline_snapshot(&self.snapshots, shared_root, &user_root);
        let committed = read_sync_state(&user_root)
            .map(|state| state.committed)
            .unwrap_or_default();
        let mut changes = self.detect_with_committed(
            shared_root,
            &user_root,
            baseline.as_ref().map(|s| s.path.as_path()),
            &committed,
        )?;
        for change in &mut changes {
            change.user = Some(username.to_string());
        }
        debug!(
            user = %username,
            baseline = ?baseline.map(|s| s.id),
            committed = committed.len(),
            changes = changes.len(),
            "Detected user changes"
        );
        Ok(changes)
    }

    /// Changes for every user copy under `<root>/.users/`, ordered by user.
    ///
    /// A user copy that cannot be scanned is logged and skipped.
    pub fn detect_all_users(&self, shared_root: &Path) -> Result<Vec<FileChange>, StorageError> {
        let mut changes = Vec::new();
        for user in list_users(shared_root)? {
            match self.detect_for_user(shared_root, &user) {
                Ok(found) => changes.extend(found),
                Err(e) => warn!(user = %user, error = %e, "Skipping unreadable user copy"),
            }
        }
        Ok(changes)
    }
}

/// Replace the hash of `key` in `index` with its content digest.
fn rehash_contents(index: &mut TreeIndex, root: &Path, key: &str) -> Result<(), StorageError> {
    if !index.files.contains_key(key) {
        return Ok(());
    }
    match file_digest(&root.join(key)) {
        Ok(hash) => {
            if let Some(file) = index.files.get_mut(key) {
                file.hash = hash;
            }
        }
        Err(StorageError::NotFound(_)) => {
            index.files.remove(key);
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Names of the user copies under `<root>/.users/`, sorted.
pub fn list_users(shared_root: &Path) -> Result<Vec<String>, StorageError> {
    let dir = users_dir(shared_root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut users: Vec<String> = fs::read_dir(&dir)?
        .flatten()
        .filter(|e| e.path().is_dir() && !is_dot_name(&e.file_name()))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    users.sort();
    Ok(users)
}

fn file_change(
    relative_path: String,
    change_type: ChangeType,
    origin: Origin,
    modified: Option<Timestamp>,
) -> FileChange {
    FileChange {
        change_type,
        relative_path,
        user: None,
        origin,
        modified_timestamp: match change_type {
            ChangeType::Deleted => None,
            _ => modified,
        },
    }
}

/// Merge the two one-sided change sets into origin-tagged changes.
fn classify(
    shared: &TreeIndex,
    user: &TreeIndex,
    main_changes: &BTreeMap<String, ChangeType>,
    user_changes: &BTreeMap<String, ChangeType>,
) -> Vec<FileChange> {
    let keys: BTreeSet<&String> = main_changes.keys().chain(user_changes.keys()).collect();
    let mut out = Vec::new();
    for key in keys {
        let shared_file = shared.get(key);
        let user_file = user.get(key);
        match (main_changes.get(key), user_changes.get(key)) {
            (Some(_), Some(user_type)) => {
                let converged = shared_file.map(|f| f.hash) == user_file.map(|f| f.hash);
                if !converged {
                    out.push(file_change(
                        key.clone(),
                        *user_type,
                        Origin::Both,
                        user_file.map(|f| f.modified),
                    ));
                }
            }
            (Some(main_type), None) => out.push(file_change(
                key.clone(),
                *main_type,
                Origin::Main,
                shared_file.map(|f| f.modified),
            )),
            (None, Some(user_type)) => out.push(file_change(
                key.clone(),
                *user_type,
                Origin::User,
                user_file.map(|f| f.modified),
            )),
            (None, None) => {}
        }
    }
    out
}
