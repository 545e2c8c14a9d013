//! Recursive directory walking
//!
//! Produces a depth-first, name-sorted listing of a directory with every
//! dot-prefixed entry (and everything below it) pruned. The root itself is never
//! pruned, so a snapshot under `.snapshots/` can be scanned directly.

use super::node::{DirectoryTree, NodeKind};
use super::path::{is_dot_name, key_from_relative};
use crate::error::StorageError;
use crate::types::{system_time_millis, Timestamp};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Walker configuration
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
}

/// One entry below the walk root.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    /// Forward-slash path relative to the walk root.
    pub relative: String,
    pub name: String,
    pub depth: usize,
    pub kind: NodeKind,
    pub modified: Timestamp,
    pub size: u64,
}

/// Walk `root` depth-first in name order, excluding the root and all dot paths.
///
/// Entries that vanish mid-walk are skipped; other I/O failures propagate.
pub fn walk(root: &Path, config: &WalkerConfig) -> Result<Vec<WalkEntry>, StorageError> {
    if !root.exists() {
        return Err(StorageError::NotFound(root.to_path_buf()));
    }

    let mut walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .min_depth(1)
        .sort_by_file_name();
    if let Some(depth) = config.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut entries = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_dot_name(e.file_name()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_vanished(&e) => {
                debug!(error = %e, "Entry vanished during walk");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) if is_vanished(&e) => {
                debug!(path = %entry.path().display(), "Entry vanished before stat");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .map(key_from_relative)
            .map_err(|_| StorageError::InvalidPath(entry.path().display().to_string()))?;

        let kind = if metadata.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };

        entries.push(WalkEntry {
            path: entry.path().to_path_buf(),
            relative,
            name: entry.file_name().to_string_lossy().into_owned(),
            depth: entry.depth(),
            kind,
            modified: metadata.modified().map(system_time_millis).unwrap_or(0),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }

    Ok(entries)
}

fn is_vanished(err: &walkdir::Error) -> bool {
    err.io_error().map(|e| e.kind()) == Some(std::io::ErrorKind::NotFound)
}

/// Scan `root` into a fresh tree.
///
/// A missing path is `NotFound`; an empty directory yields a directory node with
/// no children. Scanning a file yields a single file node.
pub fn scan(root: &Path) -> Result<DirectoryTree, StorageError> {
    let metadata = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(root.to_path_buf()),
        _ => StorageError::IoError(e),
    })?;

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let modified = metadata.modified().map(system_time_millis).unwrap_or(0);

    if !metadata.is_dir() {
        return Ok(DirectoryTree::file(
            root.to_path_buf(),
            name,
            modified,
            metadata.len(),
        ));
    }

    let entries = walk(root, &WalkerConfig::default())?;

    // Pre-order entries rebuilt with a stack of open directories; stack[0] is the root.
    let mut stack = vec![DirectoryTree::directory(root.to_path_buf(), name, modified)];
    for entry in entries {
        while stack.len() > entry.depth {
            close_top(&mut stack);
        }
        match entry.kind {
            NodeKind::Directory => {
                stack.push(DirectoryTree::directory(entry.path, entry.name, entry.modified));
            }
            NodeKind::File => {
                let file = DirectoryTree::file(entry.path, entry.name, entry.modified, entry.size);
                if let Some(children) = stack.last_mut().and_then(|d| d.children.as_mut()) {
                    children.push(file);
                }
            }
        }
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }

    stack
        .pop()
        .ok_or_else(|| StorageError::InvalidPath(root.display().to_string()))
}

fn close_top(stack: &mut Vec<DirectoryTree>) {
    if let Some(done) = stack.pop() {
        if let Some(children) = stack.last_mut().and_then(|d| d.children.as_mut()) {
            children.push(done);
        }
    }
}
