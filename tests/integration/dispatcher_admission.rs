//! Placeholder creation, hydration and admission while git commands run.

use crate::common::{hash_for, Harness, MapBlobSizes, MemoryContentStore, TestEntry};
use sparsevfs::types::FileTypeAndMode;
use sparsevfs::virtualization::{content_id_from_hash, placeholder_version_id, FileSystemResult};
use parking_lot::Mutex;
use sparsevfs::AdmissionError;
use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn entries() -> Vec<TestEntry> {
    vec![
        TestEntry::file(".gitignore", 1),
        TestEntry::file("a/b.txt", 2),
        TestEntry::file("a/c.txt", 3).mode(0o100755),
        TestEntry::file("link", 4).mode(0o120000),
    ]
}

fn store() -> MemoryContentStore {
    MemoryContentStore::default()
        .with_blob(hash_for(1), b"target/\n")
        .with_blob(hash_for(2), b"hello")
        .with_blob(hash_for(3), b"#!/bin/sh\n")
        .with_blob(hash_for(4), b"a/b.txt")
}

#[test]
fn test_enumerate_root_creates_placeholders() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    assert_eq!(*harness.instance.started_with.lock(), Some(2));

    assert_eq!(
        harness.virtualizer.on_enumerate_directory(7, ""),
        Ok(FileSystemResult::Pending)
    );
    harness.drain();

    assert_eq!(harness.instance.completion(7), Some(FileSystemResult::Success));
    assert_eq!(harness.instance.placeholder_paths(), vec![".gitignore", "a", "link"]);
    assert_eq!(
        harness.instance.symlinks.lock().clone(),
        vec![("link".to_string(), "a/b.txt".to_string())]
    );
    // Ignore files are written in full as soon as they are projected.
    assert_eq!(
        harness.instance.contents.lock().clone(),
        vec![(".gitignore".to_string(), b"target/\n".to_vec())]
    );
    assert!(harness.fatal.0.lock().is_empty());
}

#[test]
fn test_placeholder_carries_identity_and_cached_size() {
    let mut sizes = HashMap::new();
    sizes.insert(hash_for(2), 4096);
    let harness = Harness::with_sizes(&entries(), store(), MapBlobSizes(sizes));
    harness.start();

    harness.virtualizer.on_enumerate_directory(1, "A").unwrap();
    harness.drain();

    let placeholders = harness.instance.placeholders.lock().clone();
    assert_eq!(placeholders.len(), 2);
    let (path, b) = &placeholders[0];
    assert_eq!(path, "A/b.txt");
    assert_eq!(b.file_size, 4096);
    assert_eq!(b.provider_id, placeholder_version_id().to_vec());
    assert_eq!(b.content_id, content_id_from_hash(&hash_for(2)));

    // Not in the size cache, so the content store answers.
    let (_, c) = &placeholders[1];
    assert_eq!(c.file_size, 10);
    assert_eq!(c.type_and_mode, FileTypeAndMode::EXECUTABLE);
}

#[test]
fn test_unknown_paths_are_answered_synchronously() {
    let harness = Harness::new(&entries(), store());
    harness.start();

    assert_eq!(
        harness.virtualizer.on_enumerate_directory(1, "missing"),
        Ok(FileSystemResult::EFileNotFound)
    );
    assert_eq!(
        harness.virtualizer.on_enumerate_directory(2, "a/b.txt"),
        Ok(FileSystemResult::EInvalidOperation)
    );
    assert_eq!(
        harness.virtualizer.on_write_placeholder(3, "nope.txt"),
        Ok(FileSystemResult::EFileNotFound)
    );
    harness.drain();
    assert!(harness.instance.completions.lock().is_empty());
}

#[test]
fn test_placeholder_creation_waits_for_git_command() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    harness.git_lock.hold("git checkout -b topic");
    assert!(!harness.virtualizer.can_create_placeholder());

    assert_eq!(
        harness.virtualizer.on_write_placeholder(5, "a/b.txt"),
        Ok(FileSystemResult::Pending)
    );
    assert_eq!(harness.virtualizer.stats().deferred, 1);
    assert_eq!(harness.virtualizer.on_git_command_completed(), 0);

    harness.git_lock.release();
    assert_eq!(harness.virtualizer.on_git_command_completed(), 1);
    assert_eq!(harness.virtualizer.stats().deferred, 0);
    harness.drain();

    assert_eq!(harness.instance.completion(5), Some(FileSystemResult::Success));
    assert_eq!(harness.instance.placeholder_paths(), vec!["a/b.txt"]);
}

#[test]
fn test_command_completing_during_admission_still_releases_the_request() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    harness.git_lock.hold("git checkout main");

    // The command finishes and reports completion on another thread right
    // after the admission check has seen it holding the lock.
    let completer: Arc<Mutex<Option<JoinHandle<usize>>>> = Arc::new(Mutex::new(None));
    {
        let git_lock = harness.git_lock.clone();
        let virtualizer = harness.virtualizer.clone();
        let completer = completer.clone();
        harness.git_lock.on_next_read(move || {
            let (done_tx, done_rx) = mpsc::channel();
            let handle = thread::spawn(move || {
                git_lock.release();
                let released = virtualizer.on_git_command_completed();
                let _ = done_tx.send(());
                released
            });
            let _ = done_rx.recv_timeout(Duration::from_millis(200));
            *completer.lock() = Some(handle);
        });
    }

    assert_eq!(
        harness.virtualizer.on_write_placeholder(5, "a/b.txt"),
        Ok(FileSystemResult::Pending)
    );
    let handle = completer.lock().take().unwrap();
    assert_eq!(handle.join().unwrap(), 1);
    assert_eq!(harness.virtualizer.stats().deferred, 0);

    harness.drain();
    assert_eq!(harness.instance.completion(5), Some(FileSystemResult::Success));
}

#[test]
fn test_placeholder_work_before_start_is_refused() {
    let harness = Harness::new(&entries(), store());
    harness.git_lock.hold("git checkout main");
    assert_eq!(
        harness.virtualizer.on_write_placeholder(1, "a/b.txt"),
        Err(AdmissionError::NotStarted)
    );
    assert_eq!(harness.virtualizer.stats().deferred, 0);
    harness.drain();
    assert!(harness.instance.completions.lock().is_empty());
}

#[test]
fn test_status_and_add_may_create_placeholders() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    for command in ["git status", "git add .", "git stage a", "git mv a b"] {
        harness.git_lock.hold(command);
        assert!(harness.virtualizer.can_create_placeholder(), "{command}");
    }
    harness.git_lock.hold("not-git status");
    assert!(harness.virtualizer.can_create_placeholder());

    harness.git_lock.hold("git status --porcelain");
    harness.virtualizer.on_write_placeholder(1, "a").unwrap();
    assert_eq!(harness.virtualizer.stats().deferred, 0);
    harness.drain();
    assert_eq!(*harness.instance.directories.lock(), vec!["a".to_string()]);
}

#[test]
fn test_shutdown_releases_deferred_work_then_rejects() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    harness.git_lock.hold("git reset --hard");
    harness.virtualizer.on_write_placeholder(9, "a/c.txt").unwrap();

    harness.drain();
    assert_eq!(harness.instance.completion(9), Some(FileSystemResult::Success));
    assert_eq!(harness.virtualizer.stats().completed, 1);

    assert_eq!(
        harness.virtualizer.on_write_placeholder(10, "a/c.txt"),
        Err(AdmissionError::ShuttingDown)
    );
    assert_eq!(
        harness.virtualizer.request_hydration("a/c.txt"),
        Err(AdmissionError::ShuttingDown)
    );
}

#[test]
fn test_missing_blob_fails_the_command_not_the_process() {
    let harness = Harness::new(&entries(), MemoryContentStore::default());
    harness.start();
    harness.virtualizer.on_write_placeholder(3, "a/b.txt").unwrap();
    harness.drain();

    assert_eq!(harness.instance.completion(3), Some(FileSystemResult::EIOError));
    assert!(harness.fatal.0.lock().is_empty());
}

#[test]
fn test_file_stream_writes_blob_contents() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    let provider_id = placeholder_version_id();
    let content_id = content_id_from_hash(&hash_for(2));

    assert_eq!(
        harness
            .virtualizer
            .on_get_file_stream(11, "a/b.txt", &provider_id, &content_id),
        Ok(FileSystemResult::Pending)
    );
    assert_eq!(
        harness
            .virtualizer
            .on_get_file_stream(12, "a/b.txt", &[2], &content_id),
        Ok(FileSystemResult::EIOError)
    );
    assert_eq!(
        harness
            .virtualizer
            .on_get_file_stream(13, "a/b.txt", &provider_id, b"short"),
        Ok(FileSystemResult::EIOError)
    );
    harness.drain();

    assert_eq!(harness.instance.completion(11), Some(FileSystemResult::Success));
    assert_eq!(
        harness.instance.contents.lock().clone(),
        vec![("a/b.txt".to_string(), b"hello".to_vec())]
    );
}

#[test]
fn test_file_stream_is_not_deferred_by_git_commands() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    harness.git_lock.hold("git checkout main");
    let content_id = content_id_from_hash(&hash_for(3));
    harness
        .virtualizer
        .on_get_file_stream(4, "a/c.txt", &placeholder_version_id(), &content_id)
        .unwrap();
    assert_eq!(harness.virtualizer.stats().deferred, 0);
    harness.drain();
    assert_eq!(harness.instance.completion(4), Some(FileSystemResult::Success));
}

#[test]
fn test_hydration_reads_files_and_skips_missing_ones() {
    let harness = Harness::new(&entries(), store());
    std::fs::write(harness.dir.path().join("present.txt"), b"data").unwrap();
    harness.start();

    harness.virtualizer.request_hydration("present.txt").unwrap();
    harness.virtualizer.request_hydration("absent.txt").unwrap();
    harness.drain();

    assert!(harness.fatal.0.lock().is_empty());
    assert_eq!(harness.virtualizer.stats().completed, 2);
}

#[test]
fn test_start_failure_is_reported() {
    let harness = Harness::new(&entries(), store());
    *harness.instance.start_result.lock() = Some(FileSystemResult::EAccessDenied);
    assert!(matches!(
        harness.virtualizer.try_start(harness.callbacks.clone()),
        Err(AdmissionError::StartFailed(_))
    ));

    // The workers were stopped again, so nothing is admitted afterwards.
    assert_eq!(
        harness.virtualizer.on_write_placeholder(1, "a/b.txt"),
        Err(AdmissionError::ShuttingDown)
    );
    assert_eq!(
        harness.virtualizer.try_start(harness.callbacks.clone()),
        Err(AdmissionError::ShuttingDown)
    );
    harness.virtualizer.on_dot_git_file_changed(".git/HEAD");
    assert!(harness.callbacks.events().is_empty());

    harness.drain();
    assert!(harness.instance.completions.lock().is_empty());
}

#[test]
fn test_stop_and_negative_cache_pass_through() {
    let harness = Harness::new(&entries(), store());
    harness.start();
    assert_eq!(harness.virtualizer.clear_negative_path_cache(), Ok(0));
    harness.drain();
    // Draining twice is harmless.
    harness.drain();
    assert_eq!(harness.virtualizer.stop(), FileSystemResult::Success);
}
