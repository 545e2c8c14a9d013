//! Watch configuration and edge-triggered change tracking.

use crate::tree::HashMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_fs_hash_mode() -> HashMode {
    HashMode::Mtime
}

fn default_detect_hash_mode() -> HashMode {
    HashMode::Contents
}

fn default_hash_cache_ttl_secs() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    64
}

/// Watch mode configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Poll interval shared by all three watchers, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How the filesystem watcher hashes files
    #[serde(default = "default_fs_hash_mode")]
    pub fs_hash_mode: HashMode,
    /// How the file-change watcher hashes files
    #[serde(default = "default_detect_hash_mode")]
    pub detect_hash_mode: HashMode,
    /// Lifetime of cached content digests
    #[serde(default = "default_hash_cache_ttl_secs")]
    pub hash_cache_ttl_secs: u64,
    /// Notification channel capacity per watcher
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn hash_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.hash_cache_ttl_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fs_hash_mode: default_fs_hash_mode(),
            detect_hash_mode: default_detect_hash_mode(),
            hash_cache_ttl_secs: default_hash_cache_ttl_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Current target of the watchers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchParams {
    pub directory: Option<PathBuf>,
    pub user: Option<String>,
}

impl WatchParams {
    /// Directory the filesystem watcher hashes: the user copy when a user is set.
    pub fn watched_root(&self) -> Option<PathBuf> {
        let directory = self.directory.as_ref()?;
        Some(match &self.user {
            Some(user) => crate::tree::path::user_dir(directory, user),
            None => directory.clone(),
        })
    }
}

/// Remembers the last observed value and reports only changes.
#[derive(Debug, Clone)]
pub struct EdgeTrigger<T> {
    last: Option<T>,
}

impl<T: PartialEq> EdgeTrigger<T> {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Record `value`; true if it differs from the previous one (or is the first).
    pub fn update(&mut self, value: T) -> bool {
        if self.last.as_ref() == Some(&value) {
            return false;
        }
        self.last = Some(value);
        true
    }

    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Forget the last value so the next update always fires.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl<T: PartialEq> Default for EdgeTrigger<T> {
    fn default() -> Self {
        Self::new()
    }
}
