//! Reconciling on-disk placeholders with the projection.

use crate::common::{hash_for, Harness, MemoryContentStore, TestEntry};
use sparsevfs::types::FileTypeAndMode;
use sparsevfs::virtualization::{content_id_from_hash, UpdateFailureCause, UpdateType};

fn harness() -> Harness {
    let harness = Harness::new(
        &[
            TestEntry::file("tool.sh", 1).mode(0o100755),
            TestEntry::file("src/lib.rs", 2),
        ],
        MemoryContentStore::default()
            .with_blob(hash_for(1), b"echo hi\n")
            .with_blob(hash_for(2), b"pub fn f() {}\n"),
    );
    harness.start();
    harness
}

#[test]
fn test_matching_placeholder_needs_no_update() {
    let harness = harness();
    let result = harness.virtualizer.update_placeholder_if_needed(
        "src/lib.rs",
        &content_id_from_hash(&hash_for(2)),
        Some(FileTypeAndMode::REGULAR),
        UpdateType::ALLOW_DIRTY_METADATA,
    );
    assert_eq!(result, Ok(()));
    assert!(harness.instance.updates.lock().is_empty());
    harness.drain();
}

#[test]
fn test_different_content_is_a_mismatch() {
    let harness = harness();
    let result = harness.virtualizer.update_placeholder_if_needed(
        "src/lib.rs",
        &content_id_from_hash(&hash_for(9)),
        None,
        UpdateType::empty(),
    );
    assert_eq!(result, Err(UpdateFailureCause::ContentMismatch));
    harness.drain();
}

#[test]
fn test_mode_change_is_forwarded_to_the_instance() {
    let harness = harness();
    let flags = UpdateType::ALLOW_DIRTY_METADATA | UpdateType::ALLOW_READ_ONLY;
    let result = harness.virtualizer.update_placeholder_if_needed(
        "tool.sh",
        &content_id_from_hash(&hash_for(1)),
        Some(FileTypeAndMode::REGULAR),
        flags,
    );
    assert_eq!(result, Ok(()));

    let updates = harness.instance.updates.lock().clone();
    assert_eq!(updates.len(), 1);
    let (path, placeholder, passed_flags) = &updates[0];
    assert_eq!(path, "tool.sh");
    assert_eq!(placeholder.type_and_mode, FileTypeAndMode::EXECUTABLE);
    assert_eq!(placeholder.file_size, 8);
    assert_eq!(*passed_flags, flags);
    harness.drain();
}

#[test]
fn test_unprojected_and_control_paths_are_refused() {
    let harness = harness();
    let content_id = content_id_from_hash(&hash_for(2));
    assert_eq!(
        harness
            .virtualizer
            .update_placeholder_if_needed("src", &content_id, None, UpdateType::empty()),
        Err(UpdateFailureCause::NotAPlaceholder)
    );
    assert_eq!(
        harness.virtualizer.update_placeholder_if_needed(
            ".git/index",
            &content_id,
            None,
            UpdateType::empty()
        ),
        Err(UpdateFailureCause::NotSupported)
    );
    assert_eq!(
        harness
            .virtualizer
            .delete_file(".git/config", UpdateType::ALLOW_TOMBSTONE),
        Err(UpdateFailureCause::NotSupported)
    );
    harness.drain();
}

#[test]
fn test_delete_invalidates_status_cache() {
    let harness = harness();
    assert_eq!(
        harness
            .virtualizer
            .delete_file("src/lib.rs", UpdateType::ALLOW_DIRTY_METADATA),
        Ok(())
    );
    harness.drain();

    assert_eq!(*harness.instance.deletes.lock(), vec!["src/lib.rs".to_string()]);
    assert_eq!(harness.callbacks.events(), vec!["status_cache"]);
}
