//! Reusable buffer for one index record and its incremental path splitter.
//!
//! Index records arrive sorted by path, so consecutive paths usually share
//! everything up to their final separator. The splitter remembers where the
//! previous path's final separator was and, when the bytes that changed lie
//! entirely after it, only re-materializes the last segment:
//!
//! ```text
//! previous: folder/where/previous/separator/is/used/file.txt
//! current:  folder/where/previous/separator/is/used/file2.txt
//!                                                  ^    ^
//!                        previous final separator  |    replace index
//! ```

use crate::error::IndexError;
use crate::index::path_part::{PathPart, PathPartInterner};
use crate::projection::NodeId;
use crate::types::{FileTypeAndMode, MergeStage, ObjectHash};
use std::sync::Arc;

/// Size of the fixed path buffer. One byte is reserved, so the longest
/// accepted path is `MAX_PATH_BUFFER_SIZE - 1` bytes.
pub const MAX_PATH_BUFFER_SIZE: usize = 4096;

pub const PATH_SEPARATOR: u8 = b'/';

/// Turns segment bytes into the part representation a consumer wants.
pub trait PartMaterializer {
    type Part: Clone;

    fn materialize(&mut self, bytes: &[u8]) -> Self::Part;

    fn text(part: &Self::Part) -> &str;
}

/// Interned, lazily decoded parts. Used when building a new projection.
#[derive(Default)]
pub struct InternedParts {
    interner: PathPartInterner,
}

impl InternedParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interner(&self) -> &PathPartInterner {
        &self.interner
    }
}

impl PartMaterializer for InternedParts {
    type Part = Arc<PathPart>;

    fn materialize(&mut self, bytes: &[u8]) -> Self::Part {
        self.interner.intern(bytes)
    }

    fn text(part: &Self::Part) -> &str {
        part.as_str()
    }
}

/// Plain decoded strings for background consumers.
#[derive(Default, Clone, Copy)]
pub struct PlainParts;

impl PartMaterializer for PlainParts {
    type Part = String;

    fn materialize(&mut self, bytes: &[u8]) -> Self::Part {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn text(part: &Self::Part) -> &str {
        part
    }
}

/// Transient data for a single index record. Allocated once per parse
/// session and overwritten for every record; never stored in the projection.
pub struct ParsedIndexEntry<M: PartMaterializer> {
    pub hash: ObjectHash,
    pub type_and_mode: FileTypeAndMode,
    pub merge_stage: MergeStage,
    pub skip_worktree: bool,
    /// Offset at which this path starts to differ from the previous one.
    pub replace_index: usize,
    path_buffer: Box<[u8]>,
    path_length: usize,
    parts: Vec<M::Part>,
    previous_final_separator: Option<usize>,
    has_same_parent: bool,
    last_parent: Option<NodeId>,
    materializer: M,
}

impl<M: PartMaterializer> ParsedIndexEntry<M> {
    pub fn new(materializer: M) -> Self {
        Self {
            hash: ObjectHash::ZERO,
            type_and_mode: FileTypeAndMode::REGULAR,
            merge_stage: MergeStage::Normal,
            skip_worktree: false,
            replace_index: 0,
            path_buffer: vec![0u8; MAX_PATH_BUFFER_SIZE].into_boxed_slice(),
            path_length: 0,
            parts: Vec::new(),
            previous_final_separator: None,
            has_same_parent: false,
            last_parent: None,
            materializer,
        }
    }

    /// Overwrite the path from `replace_index` onwards with `suffix`.
    pub fn set_path(&mut self, replace_index: usize, suffix: &[u8]) -> Result<(), IndexError> {
        if replace_index > self.path_length {
            return Err(IndexError::InvalidPrefixLength {
                strip: self.path_length.saturating_sub(replace_index),
                previous: self.path_length,
            });
        }
        let length = replace_index + suffix.len();
        if length >= MAX_PATH_BUFFER_SIZE {
            return Err(IndexError::PathTooLong {
                length,
                max: MAX_PATH_BUFFER_SIZE - 1,
            });
        }
        self.path_buffer[replace_index..length].copy_from_slice(suffix);
        self.path_length = length;
        self.replace_index = replace_index;
        Ok(())
    }

    /// Replace the whole path, deriving the replace index from the common
    /// prefix with the previous path.
    pub fn set_full_path(&mut self, path: &[u8]) -> Result<(), IndexError> {
        let common = self
            .path()
            .iter()
            .zip(path)
            .take_while(|(a, b)| a == b)
            .count();
        self.set_path(common, &path[common..])
    }

    /// Split the current path into parts, reusing the parent parts of the
    /// previous entry when only the final segment changed.
    pub fn parse_path(&mut self) {
        let length = self.path_length;
        let mut part_start = 0;
        let mut scan_start = 0;

        let reuse_parent = match self.previous_final_separator {
            Some(separator) => {
                separator < self.replace_index
                    && !self.path_buffer[self.replace_index..length].contains(&PATH_SEPARATOR)
            }
            None => false,
        };

        if reuse_parent {
            if let Some(separator) = self.previous_final_separator {
                // Two adjacent separators never occur in index paths, so the
                // byte after the separator cannot be another separator.
                scan_start = (separator + 2).min(length);
                part_start = separator + 1;
            }
            self.parts.pop();
            self.has_same_parent = true;
        } else {
            self.parts.clear();
            self.clear_last_parent();
        }

        for i in scan_start..length {
            if self.path_buffer[i] == PATH_SEPARATOR {
                let part = self.materializer.materialize(&self.path_buffer[part_start..i]);
                self.parts.push(part);
                part_start = i + 1;
                self.previous_final_separator = Some(i);
            }
        }

        let part = self
            .materializer
            .materialize(&self.path_buffer[part_start..length]);
        self.parts.push(part);
    }

    pub fn clear_last_parent(&mut self) {
        self.previous_final_separator = None;
        self.has_same_parent = false;
        self.last_parent = None;
    }

    /// Forget everything carried over from earlier records.
    pub fn reset(&mut self) {
        self.clear_last_parent();
        self.path_length = 0;
        self.replace_index = 0;
        self.parts.clear();
    }

    pub fn path(&self) -> &[u8] {
        &self.path_buffer[..self.path_length]
    }

    pub fn path_length(&self) -> usize {
        self.path_length
    }

    pub fn parts(&self) -> &[M::Part] {
        &self.parts
    }

    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Parts of the containing folder (every part but the last).
    pub fn parent_parts(&self) -> &[M::Part] {
        let end = self.parts.len().saturating_sub(1);
        &self.parts[..end]
    }

    pub fn child_name(&self) -> Option<&M::Part> {
        self.parts.last()
    }

    pub fn has_same_parent_as_last_entry(&self) -> bool {
        self.has_same_parent
    }

    pub fn last_parent(&self) -> Option<NodeId> {
        self.last_parent
    }

    pub fn set_last_parent(&mut self, parent: NodeId) {
        self.last_parent = Some(parent);
    }

    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    /// Rebuild the relative path from its parts using `separator`.
    pub fn relative_path(&self, separator: char) -> String {
        let mut out = String::with_capacity(self.path_length);
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_str(M::text(part));
        }
        out
    }

    /// Byte ranges of each segment, independent of how parts are materialized.
    pub fn segment_bounds(&self) -> Vec<(usize, usize)> {
        let path = self.path();
        let mut bounds = Vec::with_capacity(self.parts.len());
        let mut start = 0;
        for (i, byte) in path.iter().enumerate() {
            if *byte == PATH_SEPARATOR {
                bounds.push((start, i));
                start = i + 1;
            }
        }
        bounds.push((start, path.len()));
        bounds
    }
}
