//! Content hash cache
//!
//! Owned by whoever polls a tree repeatedly. An entry is reused only while the
//! file's modification time and size are unchanged and the entry is younger than
//! the TTL; anything else re-digests the file.

use crate::types::{ContentHash, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    modified: Timestamp,
    size: u64,
    hash: ContentHash,
    inserted: Instant,
}

/// Per-path content hash cache with TTL eviction.
#[derive(Debug)]
pub struct HashCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
    ttl: Duration,
}

impl HashCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a still-valid hash for `path`.
    pub fn get(&self, path: &Path, modified: Timestamp, size: u64) -> Option<ContentHash> {
        let entries = self.entries.read();
        entries.get(path).and_then(|entry| {
            let fresh = entry.inserted.elapsed() < self.ttl;
            (fresh && entry.modified == modified && entry.size == size).then_some(entry.hash)
        })
    }

    pub fn insert(&self, path: PathBuf, modified: Timestamp, size: u64, hash: ContentHash) {
        self.entries.write().insert(
            path,
            CacheEntry {
                modified,
                size,
                hash,
                inserted: Instant::now(),
            },
        );
    }

    /// Return the cached hash or compute, store and return a fresh one.
    pub fn get_or_compute<E>(
        &self,
        path: &Path,
        modified: Timestamp,
        size: u64,
        compute: impl FnOnce() -> Result<ContentHash, E>,
    ) -> Result<ContentHash, E> {
        if let Some(hash) = self.get(path, modified, size) {
            return Ok(hash);
        }
        let hash = compute()?;
        self.insert(path.to_path_buf(), modified, size, hash);
        Ok(hash)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
