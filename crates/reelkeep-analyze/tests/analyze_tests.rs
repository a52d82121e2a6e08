use std::fs;
use std::path::Path;

use reelkeep_analyze::{DuplicateConfig, DuplicateFinder, fingerprint};
use reelkeep_core::MediaFilter;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn create_library() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    write(root, "a.mp4", "identical payload");
    write(root, "ab.mp4", "identical payload");
    write(root, "season/match [goal].mkv", "identical payload");
    // same size, different bytes
    write(root, "season/other.mp4", "different payload");
    write(root, "unique.mov", "just one");
    // not media
    write(root, "notes.txt", "identical payload");
    // pruned
    write(root, "_duplicates/old.mp4", "identical payload");
    write(root, "season/_Duplicates/older.mp4", "identical payload");
    write(root, ".hidden/copy.mp4", "identical payload");

    temp
}

#[test]
fn test_duplicate_config_builder() {
    let config = DuplicateConfig::builder()
        .quarantine_dir("_dupes")
        .filter(MediaFilter::new(["mp4"]))
        .hash_progress_every(5u64)
        .build()
        .unwrap();

    assert_eq!(config.quarantine_dir, "_dupes");
    assert_eq!(config.hash_progress_every, 5);
    assert_eq!(config.walk_progress_every, 50);

    let default_config = DuplicateConfig::default();
    assert_eq!(default_config.quarantine_dir, "_duplicates");
}

#[test]
fn test_identical_files_form_one_group() {
    let temp = create_library();
    let report = DuplicateFinder::new().find(temp.path(), &()).unwrap();

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(
        group.members,
        ["a.mp4", "ab.mp4", "season/match [goal].mkv"]
    );
    // longest file name wins regardless of depth
    assert_eq!(group.keep, "season/match [goal].mkv");
    assert_eq!(group.size_bytes, "identical payload".len() as u64);

    let expected = fingerprint(&temp.path().join("a.mp4")).unwrap();
    assert_eq!(group.hash, expected.to_hex());
    assert_eq!(group.group_id, format!("{}:{}", group.size_bytes, group.hash));

    assert_eq!(report.hash.candidate_files, 4);
    assert_eq!(report.hash.hashed_files, 4);
    assert_eq!(report.duplicate_files(), 3);
}

#[test]
fn test_quarantine_folder_is_excluded() {
    let temp = create_library();
    let report = DuplicateFinder::new().find(temp.path(), &()).unwrap();

    for group in &report.groups {
        for member in &group.members {
            assert!(!member.to_lowercase().contains("_duplicates"), "{member}");
            assert!(!member.contains(".hidden"), "{member}");
        }
    }
}

#[test]
fn test_custom_quarantine_name() {
    let temp = create_library();
    let config = DuplicateConfig::builder()
        .quarantine_dir("season")
        .build()
        .unwrap();
    let report = DuplicateFinder::with_config(config)
        .find(temp.path(), &())
        .unwrap();

    // `season` pruned, `_duplicates` now scanned
    let group = &report.groups[0];
    assert_eq!(
        group.members,
        ["_duplicates/old.mp4", "a.mp4", "ab.mp4"]
    );
}

#[test]
fn test_no_duplicates() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "one.mp4", "1");
    write(temp.path(), "two.mp4", "22");

    let report = DuplicateFinder::new().find(temp.path(), &()).unwrap();
    assert!(!report.has_duplicates());
    assert_eq!(report.hash.candidate_files, 0);
    assert_eq!(report.media_files, 2);
}

#[test]
fn test_ordering_is_deterministic() {
    let temp = TempDir::new().unwrap();
    for i in 0..3 {
        write(temp.path(), &format!("big{i}.mp4"), "xxxxxxxx");
    }
    write(temp.path(), "small1.mp4", "yy");
    write(temp.path(), "small2.mp4", "yy");
    write(temp.path(), "mid1.mp4", "zzzz");
    write(temp.path(), "mid2.mp4", "zzzz");

    let first = DuplicateFinder::new().find(temp.path(), &()).unwrap();
    let second = DuplicateFinder::new().find(temp.path(), &()).unwrap();

    let sizes: Vec<_> = first.groups.iter().map(|g| (g.count(), g.size_bytes)).collect();
    assert_eq!(sizes, [(3, 8), (2, 2), (2, 4)]);
    assert_eq!(first.groups, second.groups);
}

#[test]
fn test_missing_root() {
    let temp = TempDir::new().unwrap();
    let err = DuplicateFinder::new()
        .find(&temp.path().join("nope"), &())
        .unwrap_err();
    assert_eq!(err.kind(), reelkeep_core::ErrorKind::NotFound);
}
