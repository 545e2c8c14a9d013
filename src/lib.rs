//! FMU Sync: multi-user working copies and snapshot-backed changelogs
//!
//! Each user edits a private copy under `<root>/.users/<user>/`. Changes are detected
//! by comparing content hashes against the shared directory and the user's baseline
//! snapshot, then published with a commit that is recorded in an append-only changelog.
//! Background watchers poll the disk and emit edge-triggered notifications.

pub mod cache;
pub mod changelog;
pub mod commit;
pub mod config;
pub mod detector;
pub mod error;
pub mod files;
pub mod logging;
pub mod snapshot;
pub mod tooling;
pub mod tree;
pub mod types;
pub mod watch;

pub use changelog::{Changelog, Commit, CommitFile, SnapshotCommitBundle};
pub use commit::{commit_user_changes, CommitOutcome, CommitRequest};
pub use detector::FileChangeDetector;
pub use error::{ApiError, StorageError};
pub use files::FileManager;
pub use snapshot::{Snapshot, SnapshotStore};
pub use types::{ChangeType, ContentHash, FileChange, Origin};
