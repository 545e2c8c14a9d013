use std::fs;
use std::path::Path;

use fmu_sync::changelog::Changelog;
use fmu_sync::commit::{commit_user_changes, CommitRequest};
use fmu_sync::detector::FileChangeDetector;
use fmu_sync::error::ApiError;
use fmu_sync::files::FileManager;
use fmu_sync::types::{ChangeType, Origin};
use tempfile::TempDir;

fn manager(root: &Path, user: &str) -> FileManager {
    let mut files = FileManager::new();
    files.set_current_directory(root).unwrap();
    files.set_user(user).unwrap();
    files.initialize_user_copy().unwrap();
    files
}

fn request(user: &str, message: &str, force: bool) -> CommitRequest {
    CommitRequest {
        user: user.to_string(),
        message: message.to_string(),
        files: None,
        force,
    }
}

#[test]
fn two_users_edit_commit_and_converge() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("model.yml"), "k: 1").unwrap();
    fs::write(temp.path().join("params.yml"), "p: 1").unwrap();

    let mut alice = manager(temp.path(), "alice");
    let mut bob = manager(temp.path(), "bob");
    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();
    let detector = FileChangeDetector::default();

    alice.write_file(Path::new("model.yml"), "k: 2").unwrap();
    let first = commit_user_changes(&mut changelog, &detector, &request("alice", "tune k", false))
        .unwrap();
    assert_eq!(first.commit.files.len(), 1);
    assert_eq!(first.commit.files[0].path, "model.yml");
    assert_eq!(first.commit.files[0].action, ChangeType::Modified);

    // Bob now sees alice's edit as coming from the shared side.
    let bob_view = detector.detect_for_user(temp.path(), "bob").unwrap();
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0].origin, Origin::Main);

    // Alice's own copy matches the shared directory again.
    assert!(detector
        .detect_for_user(temp.path(), "alice")
        .unwrap()
        .is_empty());

    bob.write_file(Path::new("params.yml"), "p: 2").unwrap();
    let second = commit_user_changes(&mut changelog, &detector, &request("bob", "tune p", false))
        .unwrap();
    assert_eq!(second.commit.files[0].path, "params.yml");

    // Bob's stale model.yml is not published over alice's.
    assert_eq!(
        fs::read_to_string(temp.path().join("model.yml")).unwrap(),
        "k: 2"
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("params.yml")).unwrap(),
        "p: 2"
    );

    let history = changelog.get_changes_for_file(Path::new("model.yml")).unwrap();
    let messages: Vec<&str> = history
        .iter()
        .flat_map(|b| b.commits.iter().map(|c| c.message.as_str()))
        .collect();
    assert_eq!(messages, vec!["tune k"]);

    // Each commit lives in exactly one bundle.
    let all = changelog.get_all_changes().unwrap();
    let total: usize = all.iter().map(|b| b.commits.len()).sum();
    assert_eq!(total, 2);
    assert_eq!(all[0].commits[0].message, "tune p");
}

#[test]
fn conflicts_are_skipped_unless_forced() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a: 0").unwrap();
    fs::write(temp.path().join("b.yml"), "b: 0").unwrap();

    let mut alice = manager(temp.path(), "alice");
    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();
    let detector = FileChangeDetector::default();

    fs::write(temp.path().join("a.yml"), "a: main").unwrap();
    alice.write_file(Path::new("a.yml"), "a: alice").unwrap();
    alice.write_file(Path::new("b.yml"), "b: alice").unwrap();

    let outcome = commit_user_changes(&mut changelog, &detector, &request("alice", "mine", false))
        .unwrap();
    assert_eq!(outcome.commit.files.len(), 1);
    assert_eq!(outcome.commit.files[0].path, "b.yml");
    assert_eq!(outcome.skipped_conflicts.len(), 1);
    assert_eq!(outcome.skipped_conflicts[0].relative_path, "a.yml");
    assert_eq!(
        fs::read_to_string(temp.path().join("a.yml")).unwrap(),
        "a: main"
    );

    let forced = commit_user_changes(&mut changelog, &detector, &request("alice", "force", true))
        .unwrap();
    assert_eq!(forced.commit.files[0].path, "a.yml");
    assert_eq!(
        fs::read_to_string(temp.path().join("a.yml")).unwrap(),
        "a: alice"
    );
}

#[test]
fn deletions_are_published() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("gone.yml"), "x").unwrap();
    let _alice = manager(temp.path(), "alice");
    fs::remove_file(temp.path().join(".users/alice/gone.yml")).unwrap();

    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();
    let outcome = commit_user_changes(
        &mut changelog,
        &FileChangeDetector::default(),
        &request("alice", "remove", false),
    )
    .unwrap();

    assert_eq!(outcome.commit.files[0].action, ChangeType::Deleted);
    assert!(!temp.path().join("gone.yml").exists());
    assert!(outcome.snapshot.path.join("gone.yml").exists());
}

#[test]
fn nothing_to_commit_is_an_error() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a").unwrap();
    let _alice = manager(temp.path(), "alice");
    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();

    let snapshots_before = changelog.snapshots().unwrap().len();
    let result = commit_user_changes(
        &mut changelog,
        &FileChangeDetector::default(),
        &request("alice", "empty", false),
    );
    assert!(matches!(result, Err(ApiError::NothingToCommit)));
    assert_eq!(changelog.snapshots().unwrap().len(), snapshots_before);
}

#[test]
fn same_file_can_be_committed_twice() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a: 0").unwrap();
    let mut alice = manager(temp.path(), "alice");
    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();
    let detector = FileChangeDetector::default();

    alice.write_file(Path::new("a.yml"), "a: 1").unwrap();
    commit_user_changes(&mut changelog, &detector, &request("alice", "one", false)).unwrap();
    assert!(detector.detect_for_user(temp.path(), "alice").unwrap().is_empty());

    alice.write_file(Path::new("a.yml"), "a: 2").unwrap();
    let changes = detector.detect_for_user(temp.path(), "alice").unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!((changes[0].relative_path.as_str(), changes[0].origin), ("a.yml", Origin::User));

    let second = commit_user_changes(&mut changelog, &detector, &request("alice", "two", false))
        .unwrap();
    assert!(second.skipped_conflicts.is_empty());
    assert_eq!(fs::read_to_string(temp.path().join("a.yml")).unwrap(), "a: 2");

    // A later commit by someone else is still a shared-side change for alice.
    let mut bob = manager(temp.path(), "bob");
    bob.write_file(Path::new("a.yml"), "a: 3").unwrap();
    commit_user_changes(&mut changelog, &detector, &request("bob", "three", false)).unwrap();
    let alice_view = detector.detect_for_user(temp.path(), "alice").unwrap();
    assert_eq!(alice_view.len(), 1);
    assert_eq!(alice_view[0].origin, Origin::Main);
}

#[test]
fn user_joining_after_a_commit_starts_clean() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a: 0").unwrap();
    let mut alice = manager(temp.path(), "alice");
    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();
    let detector = FileChangeDetector::default();

    alice.write_file(Path::new("a.yml"), "a: 1").unwrap();
    let first = commit_user_changes(&mut changelog, &detector, &request("alice", "one", false))
        .unwrap();

    let mut bob = manager(temp.path(), "bob");
    assert!(detector.detect_for_user(temp.path(), "bob").unwrap().is_empty());
    bob.write_file(Path::new("a.yml"), "a: 2").unwrap();
    let changes = detector.detect_for_user(temp.path(), "bob").unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].origin, Origin::User);

    // Joining folded alice's commit into bob's baseline snapshot, once.
    changelog.refresh().unwrap();
    let all = changelog.get_all_changes().unwrap();
    let holding = all
        .iter()
        .filter(|b| b.commits.iter().any(|c| c.id == first.commit.id))
        .count();
    assert_eq!(holding, 1);
}

#[test]
fn conflict_only_commit_reports_the_conflicts() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a: 0").unwrap();
    let mut alice = manager(temp.path(), "alice");
    let mut changelog = Changelog::new();
    changelog.set_directory(temp.path()).unwrap();

    fs::write(temp.path().join("a.yml"), "a: main").unwrap();
    alice.write_file(Path::new("a.yml"), "a: alice").unwrap();

    let result = commit_user_changes(
        &mut changelog,
        &FileChangeDetector::default(),
        &request("alice", "mine", false),
    );
    match result {
        Err(ApiError::UnresolvedConflicts(conflicts)) => {
            let paths: Vec<&str> = conflicts.iter().map(|c| c.relative_path.as_str()).collect();
            assert_eq!(paths, vec!["a.yml"]);
        }
        other => panic!("expected conflicts, got {:?}", other.map(|o| o.commit.id)),
    }
}
