//! Routing of filesystem notifications inside and outside `.git`.

use crate::common::{encode_index, Harness, MemoryContentStore, TestEntry};
use sparsevfs::projection::{IndexSource, Lookup};
use std::sync::Arc;

fn harness() -> Harness {
    let harness = Harness::new(
        &[TestEntry::file("a/b.txt", 1), TestEntry::file("c.txt", 2)],
        MemoryContentStore::default(),
    );
    harness.start();
    harness
}

#[test]
fn test_index_change_rebuilds_projection() {
    let harness = harness();
    let updated = encode_index(&[TestEntry::file("fresh.txt", 3)], 2);
    harness
        .projection
        .set_source(IndexSource::Memory(Arc::from(updated)));

    harness.virtualizer.on_dot_git_file_changed(".git/index");
    harness.drain();

    assert_eq!(harness.callbacks.events(), vec!["index"]);
    assert!(!harness.projection.is_invalid());
    assert!(matches!(harness.projection.lookup("fresh.txt"), Lookup::File { .. }));
    assert_eq!(harness.projection.lookup("a"), Lookup::NotFound);
}

#[test]
fn test_control_file_changes_are_classified() {
    let harness = harness();
    let virtualizer = &harness.virtualizer;
    virtualizer.on_dot_git_file_changed(".git/logs/HEAD");
    virtualizer.on_dot_git_file_changed(".git/refs/heads/topic");
    virtualizer.on_dot_git_file_changed(".git/refs/heads/topic.lock");
    virtualizer.on_dot_git_file_changed(".git/info/exclude");
    virtualizer.on_dot_git_file_changed(".git/config");
    harness.drain();

    assert_eq!(
        harness.callbacks.events(),
        vec!["logs_head", "head_or_ref", "exclude"]
    );
}

#[test]
fn test_renames_into_dot_git_are_not_user_renames() {
    let harness = harness();
    harness
        .virtualizer
        .on_file_renamed(".git/HEAD.lock", ".git/HEAD", false);
    harness.virtualizer.on_file_renamed("c.txt", "d.txt", false);
    harness.virtualizer.on_file_renamed("a", "z", true);
    harness.drain();

    assert_eq!(
        harness.callbacks.events(),
        vec![
            "head_or_ref",
            "file_renamed:c.txt->d.txt",
            "folder_renamed:a->z"
        ]
    );
}

#[test]
fn test_deletes_are_routed() {
    let harness = harness();
    harness.virtualizer.on_file_deleted(".git/index", false);
    harness.virtualizer.on_file_deleted(".git/info/exclude", false);
    harness.virtualizer.on_file_deleted("c.txt", false);
    harness.virtualizer.on_file_deleted("a", true);
    harness.drain();

    assert_eq!(
        harness.callbacks.events(),
        vec![
            "exclude",
            "file_deleted:c.txt",
            "status_cache",
            "folder_deleted:a",
            "status_cache"
        ]
    );
}

#[test]
fn test_folder_deleted_by_git_is_not_reported() {
    let harness = harness();
    harness.git_lock.hold("git checkout other");
    harness.virtualizer.on_file_deleted("a", true);
    harness.drain();

    assert_eq!(harness.callbacks.events(), vec!["status_cache"]);
}

#[test]
fn test_hard_links_and_new_directories() {
    let harness = harness();
    harness
        .virtualizer
        .on_hard_link_created("c.txt", ".git/refs/heads/main");
    harness.virtualizer.on_hard_link_created("c.txt", "copy.txt");
    harness.virtualizer.on_new_directory_created("A");
    harness.virtualizer.on_new_directory_created("scratch");
    harness.virtualizer.on_new_directory_created(".git/objects");
    harness.drain();

    assert_eq!(
        harness.callbacks.events(),
        vec!["head_or_ref", "hard_link:copy.txt"]
    );
    assert_eq!(*harness.instance.converted.lock(), vec!["A".to_string()]);
}
