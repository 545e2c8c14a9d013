//! Core types shared across the sync core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Hash: Generic 256-bit hash value
pub type Hash = [u8; 32];

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// Convert a filesystem time to epoch milliseconds. Times before the epoch clamp to 0.
pub fn system_time_millis(time: SystemTime) -> Timestamp {
    chrono::DateTime::<chrono::Utc>::from(time)
        .timestamp_millis()
        .max(0)
}

/// Digest of a file or a directory subtree.
///
/// Equal hashes are treated as "unchanged"; collisions are an accepted risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub Hash);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let hash: Hash = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("content hash must be 32 bytes"))?;
        Ok(ContentHash(hash))
    }
}

/// Kind of divergence for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    /// The same change seen from the opposite side of a comparison.
    pub fn inverted(self) -> Self {
        match self {
            ChangeType::Added => ChangeType::Deleted,
            ChangeType::Deleted => ChangeType::Added,
            ChangeType::Modified => ChangeType::Modified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side produced a change: the shared directory, the user copy, or both (conflict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Main,
    User,
    Both,
}

impl Origin {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Origin::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Main => "main",
            Origin::User => "user",
            Origin::Both => "both",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified divergence between a user copy and the shared directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Forward-slash separated path relative to the shared root.
    pub relative_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_timestamp: Option<Timestamp>,
}
