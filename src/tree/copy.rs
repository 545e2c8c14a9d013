//! Recursive copy of tracked (non-dot) contents.

use super::node::NodeKind;
use super::walker::{walk, WalkerConfig};
use crate::error::StorageError;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Copy every tracked entry of `src` into `dst`, creating `dst` if needed.
///
/// Dot paths in `src` are skipped. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize, StorageError> {
    let entries = walk(src, &WalkerConfig::default())?;
    fs::create_dir_all(dst)?;

    let mut copied = 0;
    for entry in entries {
        let target = dst.join(&entry.relative);
        match entry.kind {
            NodeKind::Directory => fs::create_dir_all(&target)?,
            NodeKind::File => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&entry.path, &target)?;
                copied += 1;
            }
        }
    }

    debug!(src = %src.display(), dst = %dst.display(), files = copied, "Copied tree");
    Ok(copied)
}

/// Copy one file, creating parent directories of `dst`.
pub fn copy_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(src.to_path_buf()),
        _ => StorageError::IoError(e),
    })?;
    Ok(())
}

/// True when `dir` has no tracked entries (or does not exist).
pub fn is_tracked_empty(dir: &Path) -> Result<bool, StorageError> {
    if !dir.exists() {
        return Ok(true);
    }
    let config = WalkerConfig {
        max_depth: Some(1),
        ..WalkerConfig::default()
    };
    Ok(walk(dir, &config)?.is_empty())
}
