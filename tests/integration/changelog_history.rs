use std::fs;
use std::path::Path;

use fmu_sync::changelog::{Changelog, ChangelogFile, Commit, CommitFile};
use fmu_sync::snapshot::SnapshotStore;
use fmu_sync::types::ChangeType;
use tempfile::TempDir;

fn commit(author: &str, message: &str, paths: &[&str]) -> Commit {
    Commit::new(
        author,
        message,
        paths
            .iter()
            .map(|p| CommitFile {
                path: p.to_string(),
                action: ChangeType::Modified,
            })
            .collect(),
    )
}

fn open(root: &Path) -> Changelog {
    let mut changelog = Changelog::new();
    changelog.set_directory(root).unwrap();
    changelog
}

#[test]
fn refresh_is_idempotent() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a").unwrap();
    let mut changelog = open(temp.path());
    changelog.append_commit(commit("alice", "one", &["a.yml"])).unwrap();
    changelog.create_snapshot("alice").unwrap();
    changelog.append_commit(commit("bob", "two", &["a.yml"])).unwrap();

    changelog.refresh().unwrap();
    let first = changelog.get_all_changes().unwrap();
    changelog.refresh().unwrap();
    changelog.refresh().unwrap();
    assert_eq!(changelog.get_all_changes().unwrap(), first);

    // A second instance sees the same history from disk.
    assert_eq!(open(temp.path()).get_all_changes().unwrap(), first);
}

#[test]
fn append_strictly_increases_modified() {
    let temp = TempDir::new().unwrap();
    let mut changelog = open(temp.path());
    let mut last = changelog.modified_timestamp().unwrap();
    for i in 0..5 {
        assert!(changelog
            .append_commit(commit("alice", &format!("c{}", i), &["a.yml"]))
            .unwrap());
        let modified = changelog.modified_timestamp().unwrap();
        assert!(modified > last);
        last = modified;
    }
    assert_eq!(changelog.live_commit_count(), 5);
}

#[test]
fn commits_are_appended_in_order() {
    let temp = TempDir::new().unwrap();
    let mut changelog = open(temp.path());
    let first = commit("alice", "first", &["a.yml"]);
    let second = commit("alice", "second", &["a.yml"]);
    changelog.append_commit(first.clone()).unwrap();
    changelog.append_commit(second.clone()).unwrap();

    let on_disk = ChangelogFile::read(&temp.path().join(".changelog.json")).unwrap();
    let ids: Vec<&str> = on_disk.log.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

    // Newest first when read back.
    let bundles = changelog.get_all_changes().unwrap();
    assert_eq!(bundles[0].commits[0].id, second.id);
}

#[test]
fn snapshots_are_immutable() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.yml"), "a: 0").unwrap();
    let mut changelog = open(temp.path());
    changelog.append_commit(commit("alice", "before", &["a.yml"])).unwrap();

    let snapshot = changelog.create_snapshot("alice").unwrap();
    let frozen = snapshot.changelog().unwrap();

    fs::write(temp.path().join("a.yml"), "a: 1").unwrap();
    changelog.append_commit(commit("bob", "after", &["a.yml"])).unwrap();
    changelog.create_snapshot("bob").unwrap();

    assert_eq!(fs::read_to_string(snapshot.path.join("a.yml")).unwrap(), "a: 0");
    assert_eq!(snapshot.changelog().unwrap(), frozen);
    assert_eq!(frozen.log.len(), 1);
    assert_eq!(frozen.log[0].message, "before");
}

#[test]
fn snapshot_folds_live_log_into_history() {
    let temp = TempDir::new().unwrap();
    let mut changelog = open(temp.path());
    let c = commit("alice", "folded", &["a.yml"]);
    changelog.append_commit(c.clone()).unwrap();
    let snapshot = changelog.create_snapshot("alice").unwrap();

    assert_eq!(changelog.live_commit_count(), 0);
    let bundles = changelog.get_all_changes().unwrap();
    let holding: Vec<_> = bundles
        .iter()
        .filter(|b| b.commits.iter().any(|x| x.id == c.id))
        .collect();
    assert_eq!(holding.len(), 1);
    assert_eq!(holding[0].snapshot_path.as_deref(), Some(snapshot.path.as_path()));

    let store = SnapshotStore::new();
    assert!(store.exists(temp.path(), "alice"));
    assert!(!store.exists(temp.path(), "bob"));
    assert_eq!(store.latest(temp.path()).unwrap().id, snapshot.id);
}

#[test]
fn bundles_are_ordered_newest_first() {
    let temp = TempDir::new().unwrap();
    let mut changelog = open(temp.path());
    for round in 0..3 {
        changelog
            .append_commit(commit("alice", &format!("r{}", round), &["a.yml"]))
            .unwrap();
        changelog.create_snapshot("alice").unwrap();
    }
    changelog.append_commit(commit("alice", "live", &["a.yml"])).unwrap();

    let bundles = changelog.get_all_changes().unwrap();
    assert!(bundles[0].is_live());
    for pair in bundles.windows(2) {
        assert!(pair[0].modified >= pair[1].modified);
    }
    for bundle in &bundles {
        for pair in bundle.commits.windows(2) {
            assert!(pair[0].datetime >= pair[1].datetime);
        }
    }
}

#[test]
fn changes_for_file_filters_commits() {
    let temp = TempDir::new().unwrap();
    let mut changelog = open(temp.path());
    changelog.append_commit(commit("alice", "a", &["ert/a.yml"])).unwrap();
    changelog.append_commit(commit("bob", "b", &["b.yml"])).unwrap();
    changelog.create_snapshot("bob").unwrap();
    changelog.append_commit(commit("carol", "a again", &["ert/a.yml"])).unwrap();

    let bundles = changelog.get_changes_for_file(Path::new("ert/a.yml")).unwrap();
    let messages: Vec<&str> = bundles
        .iter()
        .flat_map(|b| b.commits.iter().map(|c| c.message.as_str()))
        .collect();
    assert_eq!(messages, vec!["a again", "a"]);

    // Paths inside a user copy resolve to the shared key.
    let root = fs::canonicalize(temp.path()).unwrap();
    let via_user = changelog
        .get_changes_for_file(&root.join(".users/alice/ert/a.yml"))
        .unwrap();
    assert_eq!(via_user, bundles);

    assert!(changelog
        .get_changes_for_file(Path::new("missing.yml"))
        .unwrap()
        .is_empty());
}

#[test]
fn malformed_changelog_is_recreated() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".changelog.json"), "{ not json").unwrap();

    let mut changelog = open(temp.path());
    let bundles = changelog.get_all_changes().unwrap();
    assert_eq!(bundles.len(), 1);
    assert!(bundles[0].commits.is_empty());

    assert!(changelog.append_commit(commit("alice", "fresh", &["a.yml"])).unwrap());
    let on_disk = ChangelogFile::read(&temp.path().join(".changelog.json")).unwrap();
    assert_eq!(on_disk.log.len(), 1);
}

#[test]
fn incomplete_snapshot_is_ignored() {
    let temp = TempDir::new().unwrap();
    let mut changelog = open(temp.path());
    changelog.create_snapshot("alice").unwrap();

    // A snapshot directory without its changelog, as left by an interrupted copy.
    fs::create_dir_all(temp.path().join(".snapshots/9999999999999-00000000-bob")).unwrap();

    changelog.refresh().unwrap();
    assert_eq!(changelog.snapshots().unwrap().len(), 1);
    assert_eq!(changelog.get_all_changes().unwrap().len(), 2);
}

#[test]
fn operations_require_directory() {
    let mut changelog = Changelog::new();
    assert!(changelog.get_all_changes().is_err());
    assert!(changelog.append_commit(commit("alice", "x", &[])).is_err());
    assert!(changelog.refresh().is_err());
}
