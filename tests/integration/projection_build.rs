//! Building a projection from index files on disk and in memory.

use crate::common::{encode_index, hash_for, TestEntry};
use sparsevfs::projection::{IndexProjection, Lookup, ProjectedKind};
use sparsevfs::types::FileTypeAndMode;
use sparsevfs::{IndexError, ProjectionError};
use tempfile::TempDir;

#[test]
fn test_two_files_share_one_parent_lookup() {
    let data = encode_index(&[TestEntry::file("a/b.txt", 1), TestEntry::file("a/c.txt", 2)], 2);
    let projection = IndexProjection::from_bytes(data);
    let stats = projection.build().unwrap();

    assert_eq!(stats.entries, 2);
    assert_eq!(stats.files, 2);
    assert_eq!(stats.parent_lookups, 1);

    let children = projection.enumerate_children("a").unwrap();
    let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["b.txt", "c.txt"]);
    assert_eq!(
        children[1].kind,
        ProjectedKind::File {
            hash: hash_for(2),
            type_and_mode: FileTypeAndMode::REGULAR,
        }
    );
}

#[test]
fn test_all_index_versions_project_the_same_tree() {
    let entries = [
        TestEntry::file("README.md", 1),
        TestEntry::file("src/bin/tool.rs", 2).mode(0o100755),
        TestEntry::file("src/lib.rs", 3),
        TestEntry::file("src/link", 4).mode(0o120000),
        TestEntry::file("tests/it.rs", 5),
    ];

    let mut snapshots = Vec::new();
    for version in [2, 3, 4] {
        let projection = IndexProjection::from_bytes(encode_index(&entries, version));
        projection.build().unwrap();
        let mut seen = Vec::new();
        for path in ["", "src", "src/bin", "tests"] {
            for child in projection.enumerate_children(path).unwrap() {
                seen.push(format!("{path}/{}:{:?}", child.name, child.kind));
            }
        }
        snapshots.push(seen);
    }
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);

    let projection = IndexProjection::from_bytes(encode_index(&entries, 4));
    projection.build().unwrap();
    match projection.lookup("src/link") {
        Lookup::File { type_and_mode, .. } => assert!(type_and_mode.is_symlink()),
        other => panic!("expected a file, got {other:?}"),
    }
    match projection.lookup("SRC/BIN/TOOL.RS") {
        Lookup::File { type_and_mode, .. } => assert!(type_and_mode.is_executable()),
        other => panic!("expected a file, got {other:?}"),
    }
}

#[test]
fn test_builds_from_index_file_on_disk() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");
    std::fs::write(
        &index_path,
        encode_index(&[TestEntry::file("docs/intro.md", 9)], 3),
    )
    .unwrap();

    let projection = IndexProjection::from_path(&index_path);
    assert!(projection.rebuild_if_needed().unwrap().is_some());
    assert_eq!(projection.lookup("docs"), Lookup::Folder { enumerated: true });
    assert_eq!(
        projection.placeholder_file_data("docs/intro.md").map(|(hash, _)| hash),
        Some(hash_for(9))
    );
}

#[test]
fn test_index_change_is_picked_up_after_invalidate() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");
    std::fs::write(&index_path, encode_index(&[TestEntry::file("old.txt", 1)], 2)).unwrap();

    let projection = IndexProjection::from_path(&index_path);
    projection.build().unwrap();
    assert!(matches!(projection.lookup("old.txt"), Lookup::File { .. }));

    std::fs::write(&index_path, encode_index(&[TestEntry::file("new.txt", 2)], 2)).unwrap();
    assert!(projection.rebuild_if_needed().unwrap().is_none());
    projection.invalidate();
    projection.rebuild_if_needed().unwrap();

    assert_eq!(projection.lookup("old.txt"), Lookup::NotFound);
    assert!(matches!(projection.lookup("new.txt"), Lookup::File { .. }));
}

#[test]
fn test_missing_index_file_fails_and_stays_invalid() {
    let dir = TempDir::new().unwrap();
    let projection = IndexProjection::from_path(dir.path().join("missing"));

    let err = projection.build().unwrap_err();
    assert!(matches!(err, ProjectionError::Index(IndexError::Io(_))));
    assert!(projection.is_invalid());
}

#[test]
fn test_corrupt_signature_is_rejected() {
    let mut data = encode_index(&[TestEntry::file("a.txt", 1)], 2);
    data[..4].copy_from_slice(b"XXXX");
    let projection = IndexProjection::from_bytes(data);
    assert!(matches!(
        projection.build(),
        Err(ProjectionError::Index(IndexError::InvalidSignature(_)))
    ));
}
