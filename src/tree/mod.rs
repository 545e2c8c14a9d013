//! Directory Tree Scanner
//!
//! Walks a directory recursively into a fresh `DirectoryTree` and derives a
//! deterministic `ContentHash` from it. Dot-prefixed entries (`.users`,
//! `.snapshots`, `.changelog.json`, ...) are bookkeeping and never appear in a
//! scanned tree, a hash, or a recursive copy.

pub mod copy;
pub mod hasher;
pub mod node;
pub mod path;
pub mod walker;

pub use hasher::{hash, hash_path, hash_tree, HashMode};
pub use node::{DirectoryTree, NodeKind};
pub use walker::scan;
