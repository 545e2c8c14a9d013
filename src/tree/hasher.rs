//! Hash computation for scanned trees
//!
//! A file hashes either its modification time and size (fast path, used by
//! polling) or its full contents (slow path). A directory hashes its children's
//! names and hashes in traversal order, so renames, additions and removals all
//! change the parent hash.

use super::node::{DirectoryTree, NodeKind};
use super::walker::scan;
use crate::cache::HashCache;
use crate::error::StorageError;
use crate::types::ContentHash;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// How file nodes are hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Modification time and size only.
    #[default]
    Mtime,
    /// Full content digest.
    Contents,
}

impl HashMode {
    pub fn from_include_contents(include_file_contents: bool) -> Self {
        if include_file_contents {
            HashMode::Contents
        } else {
            HashMode::Mtime
        }
    }
}

/// Scan `path` and hash it. `include_file_contents` selects the slow path.
pub fn hash(path: &Path, include_file_contents: bool) -> Result<ContentHash, StorageError> {
    hash_path(path, HashMode::from_include_contents(include_file_contents))
}

/// Scan `path` and hash it with the given mode.
pub fn hash_path(path: &Path, mode: HashMode) -> Result<ContentHash, StorageError> {
    let tree = scan(path)?;
    hash_tree(&tree, mode, None)
}

/// Hash an already scanned tree, optionally reusing cached file digests.
pub fn hash_tree(
    tree: &DirectoryTree,
    mode: HashMode,
    cache: Option<&HashCache>,
) -> Result<ContentHash, StorageError> {
    match tree.kind {
        NodeKind::File => hash_file_node(tree, mode, cache),
        NodeKind::Directory => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(b"dir\0");
            for child in tree.children() {
                let child_hash = hash_tree(child, mode, cache)?;
                hasher.update(child.name.as_bytes());
                hasher.update(&[0]);
                hasher.update(child_hash.as_bytes());
            }
            Ok(ContentHash(*hasher.finalize().as_bytes()))
        }
    }
}

fn hash_file_node(
    node: &DirectoryTree,
    mode: HashMode,
    cache: Option<&HashCache>,
) -> Result<ContentHash, StorageError> {
    match mode {
        HashMode::Mtime => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(b"mtime\0");
            hasher.update(&node.modified_time.to_le_bytes());
            hasher.update(&node.size.to_le_bytes());
            Ok(ContentHash(*hasher.finalize().as_bytes()))
        }
        HashMode::Contents => match cache {
            Some(cache) => cache.get_or_compute(&node.path, node.modified_time, node.size, || {
                file_digest(&node.path)
            }),
            None => file_digest(&node.path),
        },
    }
}

/// Streaming blake3 digest of a file's bytes.
pub fn file_digest(path: &Path) -> Result<ContentHash, StorageError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
        _ => StorageError::IoError(e),
    })?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(ContentHash(*hasher.finalize().as_bytes()))
}
