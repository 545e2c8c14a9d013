use std::fs;
use std::path::Path;

use fmu_sync::tree::{hash, hash_path, scan, HashMode};
use proptest::prelude::*;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn hash_is_stable_across_calls() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "model.yml", "a: 1");
    write(temp.path(), "ert/params.yml", "p: 2");

    for include_contents in [false, true] {
        let first = hash(temp.path(), include_contents).unwrap();
        let second = hash(temp.path(), include_contents).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn identical_trees_hash_identically_by_contents() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    for root in [a.path(), b.path()] {
        write(root, "x.yml", "x");
        write(root, "nested/y.yml", "y");
    }
    assert_eq!(
        hash_path(a.path(), HashMode::Contents).unwrap(),
        hash_path(b.path(), HashMode::Contents).unwrap()
    );
}

#[test]
fn bookkeeping_never_affects_scan_or_hash() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.yml", "a");
    let before = hash(temp.path(), true).unwrap();

    write(temp.path(), ".users/alice/a.yml", "mine");
    write(temp.path(), ".snapshots/0000000000001-deadbeef-alice/a.yml", "old");
    write(temp.path(), ".changelog.json", "{}");
    write(temp.path(), "sub/.hidden", "h");

    assert_eq!(hash(temp.path(), true).unwrap(), before);

    let tree = scan(temp.path()).unwrap();
    let names: Vec<&str> = tree.children().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a.yml", "sub"]);
    let sub = &tree.children()[1];
    assert!(sub.children().is_empty());
}

#[test]
fn scan_missing_directory_fails() {
    let temp = TempDir::new().unwrap();
    assert!(scan(&temp.path().join("nope")).is_err());
    assert!(hash(&temp.path().join("nope"), false).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn content_hash_tracks_file_contents(
        files in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9 ]{0,32}", 1..6),
        extra in "[a-z0-9]{1,16}",
    ) {
        let temp = TempDir::new().unwrap();
        for (name, content) in &files {
            write(temp.path(), &format!("{}.yml", name), content);
        }
        let original = hash(temp.path(), true).unwrap();
        prop_assert_eq!(original, hash(temp.path(), true).unwrap());

        let (name, content) = files.iter().next().unwrap();
        write(temp.path(), &format!("{}.yml", name), &format!("{}{}", content, extra));
        prop_assert_ne!(original, hash(temp.path(), true).unwrap());
    }
}
