use std::fs;
use std::path::Path;

use fmu_sync::detector::FileChangeDetector;
use fmu_sync::files::FileManager;
use fmu_sync::tree::HashMode;
use fmu_sync::types::{ChangeType, FileChange, Origin};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Shared directory with `a.yml`, `b.yml`, `c.yml` and an initialized copy for `user`.
fn workspace(user: &str) -> (TempDir, FileManager) {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.yml", "a: 0");
    write(temp.path(), "b.yml", "b: 0");
    write(temp.path(), "c.yml", "c: 0");
    let mut files = FileManager::new();
    files.set_current_directory(temp.path()).unwrap();
    files.set_user(user).unwrap();
    assert!(files.initialize_user_copy().unwrap());
    (temp, files)
}

fn find<'a>(changes: &'a [FileChange], path: &str) -> &'a FileChange {
    changes
        .iter()
        .find(|c| c.relative_path == path)
        .unwrap_or_else(|| panic!("no change for {}", path))
}

#[test]
fn fresh_user_copy_has_no_changes() {
    let (temp, _files) = workspace("alice");
    let changes = FileChangeDetector::default()
        .detect_for_user(temp.path(), "alice")
        .unwrap();
    assert!(changes.is_empty());
}

#[test]
fn three_way_detection_attributes_origin() {
    let (temp, mut files) = workspace("alice");

    // User edits a, deletes b, adds d.
    files.write_file(Path::new("a.yml"), "a: user").unwrap();
    fs::remove_file(temp.path().join(".users/alice/b.yml")).unwrap();
    files.write_file(Path::new("d.yml"), "d: 1").unwrap();

    // Shared side edits c and a differently.
    write(temp.path(), "c.yml", "c: main");
    write(temp.path(), "a.yml", "a: main");

    let changes = FileChangeDetector::default()
        .detect_for_user(temp.path(), "alice")
        .unwrap();

    let a = find(&changes, "a.yml");
    assert_eq!(a.origin, Origin::Both);
    assert_eq!(a.change_type, ChangeType::Modified);
    assert!(a.origin.is_conflict());

    let b = find(&changes, "b.yml");
    assert_eq!((b.change_type, b.origin), (ChangeType::Deleted, Origin::User));
    assert_eq!(b.modified_timestamp, None);

    let c = find(&changes, "c.yml");
    assert_eq!(c.origin, Origin::Main);

    let d = find(&changes, "d.yml");
    assert_eq!((d.change_type, d.origin), (ChangeType::Added, Origin::User));
    assert!(d.modified_timestamp.is_some());

    assert!(changes.iter().all(|c| c.user.as_deref() == Some("alice")));
    assert_eq!(changes.len(), 4);
}

#[test]
fn identical_edits_on_both_sides_are_not_changes() {
    let (temp, mut files) = workspace("alice");
    files.write_file(Path::new("a.yml"), "a: same").unwrap();
    write(temp.path(), "a.yml", "a: same");

    let changes = FileChangeDetector::default()
        .detect_for_user(temp.path(), "alice")
        .unwrap();
    assert!(changes.is_empty());
}

#[test]
fn without_baseline_everything_is_the_users() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.yml", "a: 0");
    write(temp.path(), ".users/bob/a.yml", "a: 1");
    write(temp.path(), ".users/bob/extra.yml", "x");

    let changes = FileChangeDetector::new(HashMode::Contents)
        .detect_for_user(temp.path(), "bob")
        .unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.origin == Origin::User));
    assert_eq!(find(&changes, "extra.yml").change_type, ChangeType::Added);
}

#[test]
fn all_users_are_compared() {
    let (temp, mut alice) = workspace("alice");
    let mut bob = FileManager::new();
    bob.set_current_directory(temp.path()).unwrap();
    bob.set_user("bob").unwrap();
    bob.initialize_user_copy().unwrap();

    alice.write_file(Path::new("a.yml"), "a: alice").unwrap();
    bob.write_file(Path::new("b.yml"), "b: bob").unwrap();

    let changes = FileChangeDetector::default()
        .detect_all_users(temp.path())
        .unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].user.as_deref(), Some("alice"));
    assert_eq!(changes[0].relative_path, "a.yml");
    assert_eq!(changes[1].user.as_deref(), Some("bob"));
    assert_eq!(changes[1].relative_path, "b.yml");
}

#[test]
fn file_manager_reads_through_private_copy() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "ert/a.yml", "shared");
    let mut files = FileManager::new();
    files.set_current_directory(temp.path()).unwrap();
    files.set_user("alice").unwrap();

    let read = files.read_file(Path::new("ert/a.yml")).unwrap();
    assert_eq!(read.content.as_deref(), Some("shared"));

    files.write_file(Path::new("ert/a.yml"), "private").unwrap();
    let read = files.read_file(Path::new("ert/a.yml")).unwrap();
    assert_eq!(read.content.as_deref(), Some("private"));
    assert_eq!(
        fs::read_to_string(temp.path().join("ert/a.yml")).unwrap(),
        "shared"
    );

    let missing = files.read_file(Path::new("nope.yml")).unwrap();
    assert!(!missing.success);
    assert!(files.last_error().is_some());
}
