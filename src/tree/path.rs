//! Path helpers and the on-disk layout of a shared directory.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Per-user private copies live under `<root>/.users/<username>/`.
pub const USERS_DIR: &str = ".users";

/// Frozen copies live under `<root>/.snapshots/<snapshot-id>/`.
pub const SNAPSHOTS_DIR: &str = ".snapshots";

/// Live changelog fragment at a directory root (and frozen inside each snapshot).
pub const CHANGELOG_FILE: &str = ".changelog.json";

/// Per-user sync state inside a user copy.
pub const SYNC_STATE_FILE: &str = ".sync.json";

/// True for names that start with `.`
pub fn is_dot_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// True if any segment of `relative` is a dot name.
pub fn has_dot_segment(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => is_dot_name(name),
        _ => false,
    })
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Forward-slash key of `path` relative to `root`, or `None` if `path` is not below `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = normalize_path(path)
        .strip_prefix(normalize_path(root))
        .ok()?
        .to_path_buf();
    Some(key_from_relative(&rel))
}

/// Join the normal components of a relative path with `/`.
pub fn key_from_relative(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Absolute form of `path`, resolved against the current directory when relative.
///
/// Existing paths are canonicalized (without the Windows verbatim prefix);
/// missing ones are normalized lexically.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return Ok(canonical);
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_path(&joined))
}

pub fn users_dir(root: &Path) -> PathBuf {
    root.join(USERS_DIR)
}

pub fn user_dir(root: &Path, username: &str) -> PathBuf {
    root.join(USERS_DIR).join(username)
}

pub fn snapshots_dir(root: &Path) -> PathBuf {
    root.join(SNAPSHOTS_DIR)
}

pub fn changelog_path(root: &Path) -> PathBuf {
    root.join(CHANGELOG_FILE)
}
