//! Scanned tree node types

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One node of a scanned directory tree.
///
/// `children` is `Some` exactly when `kind` is `Directory`. Children are sorted
/// by name, which is also the traversal order used for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryTree {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub modified_time: Timestamp,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DirectoryTree>>,
}

impl DirectoryTree {
    pub(crate) fn file(path: PathBuf, name: String, modified_time: Timestamp, size: u64) -> Self {
        Self {
            path,
            name,
            kind: NodeKind::File,
            modified_time,
            size,
            children: None,
        }
    }

    pub(crate) fn directory(path: PathBuf, name: String, modified_time: Timestamp) -> Self {
        Self {
            path,
            name,
            kind: NodeKind::Directory,
            modified_time,
            size: 0,
            children: Some(Vec::new()),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn children(&self) -> &[DirectoryTree] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Iterate over every file node below (and including) this node.
    pub fn files(&self) -> Vec<&DirectoryTree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node.kind {
                NodeKind::File => out.push(node),
                NodeKind::Directory => stack.extend(node.children().iter().rev()),
            }
        }
        out
    }

    /// Total number of nodes including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }
}
