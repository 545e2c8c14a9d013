use std::fs;
use std::time::Duration;

use fmu_sync::changelog::Commit;
use fmu_sync::watch::{Notification, Request, Response, WatchConfig, WatchDaemon};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn fast() -> WatchConfig {
    WatchConfig {
        poll_interval_ms: 25,
        ..WatchConfig::default()
    }
}

async fn next(rx: &mut mpsc::Receiver<Notification>) -> Notification {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("watcher channel closed")
}

#[tokio::test]
async fn watchers_follow_user_edits_and_commits() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a: 0").unwrap();
    fs::create_dir_all(temp.path().join(".users/alice")).unwrap();
    fs::write(temp.path().join(".users/alice/a.yml"), "a: 0").unwrap();

    let (mut daemon, mut channels) = WatchDaemon::start(fast());
    let set = daemon
        .request(Request::SetDirectory {
            directory: temp.path().to_path_buf(),
        })
        .await;
    assert!(matches!(set, Response::DirectorySet { .. }));
    daemon
        .request(Request::SetUser {
            username: "alice".to_string(),
        })
        .await;

    // First observations establish the baseline and notify.
    assert!(matches!(
        next(&mut channels.file_changes).await,
        Notification::FileChanges { .. }
    ));
    assert_eq!(next(&mut channels.changelog).await, Notification::Modified {});

    fs::write(temp.path().join(".users/alice/a.yml"), "a: 1").unwrap();
    loop {
        if let Notification::FileChanges { file_changes } = next(&mut channels.file_changes).await {
            if file_changes.iter().any(|c| c.relative_path == "a.yml") {
                break;
            }
        }
    }

    let commit = Commit::new("alice", "from watcher", vec![]);
    let appended = daemon
        .request(Request::AppendCommit {
            commit: commit.clone(),
        })
        .await;
    assert!(!appended.is_error());
    assert_eq!(next(&mut channels.changelog).await, Notification::Modified {});

    match daemon.request(Request::GetAllChanges {}).await {
        Response::AllChanges { changes } => {
            assert!(changes[0].commits.iter().any(|c| c.id == commit.id));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    daemon.stop().await;
    assert!(!daemon.is_running());
}

#[tokio::test]
async fn set_directory_rejects_missing_path() {
    let temp = TempDir::new().unwrap();
    let (mut daemon, _channels) = WatchDaemon::start(fast());
    let response = daemon
        .request(Request::SetDirectory {
            directory: temp.path().join("missing"),
        })
        .await;
    assert!(response.is_error());
    assert_eq!(daemon.params().directory, None);
    daemon.stop().await;
}

#[test]
fn messages_use_kebab_case_envelope() {
    let request: Request = serde_json::from_str(
        r#"{"type":"set-directory","payload":{"directory":"/tmp/fmu"}}"#,
    )
    .unwrap();
    assert!(matches!(request, Request::SetDirectory { .. }));

    let value = serde_json::to_value(Response::CommitAppended {
        commit_id: "c1".to_string(),
    })
    .unwrap();
    assert_eq!(value["type"], "commit-appended");
    assert_eq!(value["payload"]["commitId"], "c1");
}
