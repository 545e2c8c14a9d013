//! Request/response/notification envelopes exchanged with watchers.
//!
//! On the wire every message is `{"type": "<kebab-case>", "payload": {...}}`.

use crate::changelog::{Changelog, Commit, SnapshotCommitBundle};
use crate::error::ApiError;
use crate::types::{ContentHash, FileChange};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Request {
    SetDirectory {
        directory: PathBuf,
    },
    SetUser {
        username: String,
    },
    AppendCommit {
        commit: Commit,
    },
    GetChangesForFile {
        #[serde(rename = "filePath")]
        file_path: PathBuf,
    },
    GetAllChanges {},
}

/// Replies to `Request`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Response {
    DirectorySet {
        directory: PathBuf,
    },
    UserSet {
        username: String,
    },
    CommitAppended {
        #[serde(rename = "commitId")]
        commit_id: String,
    },
    ChangesForFile {
        changes: Vec<SnapshotCommitBundle>,
    },
    AllChanges {
        changes: Vec<SnapshotCommitBundle>,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn error(err: impl ToString) -> Self {
        Response::Error {
            error: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        Response::error(err)
    }
}

/// Edge-triggered notifications emitted by watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Notification {
    /// The changelog changed on disk.
    Modified {},
    /// The file-change detector result changed.
    FileChanges {
        #[serde(rename = "fileChanges")]
        file_changes: Vec<FileChange>,
    },
    /// The watched tree hash changed.
    FilesystemChanged { hash: ContentHash },
}

/// Serve one request against a changelog. Read requests refresh from disk first.
pub fn handle_request(changelog: &mut Changelog, request: Request) -> Response {
    match request {
        Request::SetDirectory { directory } => match changelog.set_directory(&directory) {
            Ok(()) => match changelog.directory() {
                Ok(dir) => Response::DirectorySet {
                    directory: dir.to_path_buf(),
                },
                Err(e) => e.into(),
            },
            Err(e) => e.into(),
        },
        Request::SetUser { username } => Response::UserSet { username },
        Request::AppendCommit { commit } => {
            let commit_id = commit.id.clone();
            match changelog.append_commit(commit) {
                Ok(true) => Response::CommitAppended { commit_id },
                Ok(false) => Response::error(
                    changelog
                        .last_error()
                        .unwrap_or("Failed to append commit"),
                ),
                Err(e) => e.into(),
            }
        }
        Request::GetChangesForFile { file_path } => changelog
            .refresh()
            .and_then(|_| changelog.get_changes_for_file(&file_path))
            .map(|changes| Response::ChangesForFile { changes })
            .unwrap_or_else(Response::from),
        Request::GetAllChanges {} => changelog
            .refresh()
            .and_then(|_| changelog.get_all_changes())
            .map(|changes| Response::AllChanges { changes })
            .unwrap_or_else(Response::from),
    }
}
