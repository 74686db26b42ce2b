//! Index projection
//!
//! Replays the sorted index into an in-memory folder/file tree describing the
//! working copy git expects, and answers the metadata queries the dispatcher
//! makes from driver callback threads.

pub mod builder;
pub mod engine;
pub mod tree;

pub use builder::BuildStats;
pub use engine::{IndexProjection, IndexSource};
pub use tree::{FileNode, FolderNode, NodeId, ProjectedNode, ProjectionTree};

use crate::types::{FileTypeAndMode, ObjectHash};

/// Result of looking up a single path in the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    File {
        hash: ObjectHash,
        type_and_mode: FileTypeAndMode,
    },
    Folder {
        enumerated: bool,
    },
}

/// Kind of a projected child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectedKind {
    Folder,
    File {
        hash: ObjectHash,
        type_and_mode: FileTypeAndMode,
    },
}

/// Child descriptor returned by directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedFileInfo {
    /// Case-preserved name as it appears in the index.
    pub name: String,
    pub kind: ProjectedKind,
}

impl ProjectedFileInfo {
    pub fn is_folder(&self) -> bool {
        self.kind == ProjectedKind::Folder
    }
}

/// Hashes recorded for a path with unresolved merge stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: String,
    pub base: Option<ObjectHash>,
    pub ours: Option<ObjectHash>,
    pub theirs: Option<ObjectHash>,
}
