//! Shared, thread-safe index projection.
//!
//! Readers take a shared lock on the current state. A full rebuild parses the
//! index without holding any lock and swaps the finished state in, so callback
//! threads never observe a half-built tree.

use crate::error::ProjectionError;
use crate::index::{fold_case, read_index_file, PathPart};
use crate::projection::builder::{
    build_projection, expand_from_index, find_or_create_folder, BuildStats, ProjectionState,
};
use crate::projection::tree::{FileNode, NodeId, ProjectedNode};
use crate::projection::{ConflictEntry, Lookup, ProjectedFileInfo, ProjectedKind};
use crate::types::{FileTypeAndMode, MergeStage, ObjectHash};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Where the projection reads index bytes from.
#[derive(Debug, Clone)]
pub enum IndexSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl IndexSource {
    fn load(&self) -> Result<Arc<[u8]>, ProjectionError> {
        match self {
            IndexSource::File(path) => Ok(Arc::from(read_index_file(path)?)),
            IndexSource::Memory(bytes) => Ok(Arc::clone(bytes)),
        }
    }
}

pub struct IndexProjection {
    source: RwLock<IndexSource>,
    state: RwLock<ProjectionState>,
    /// Serializes writers: full rebuilds, expansions and incremental updates.
    rebuild_lock: Mutex<()>,
    invalid: AtomicBool,
    last_stats: Mutex<Option<BuildStats>>,
}

impl IndexProjection {
    /// Create an empty projection over `source`. It starts out invalid, so
    /// the first [`rebuild_if_needed`](Self::rebuild_if_needed) builds it.
    pub fn new(source: IndexSource) -> Self {
        Self {
            source: RwLock::new(source),
            state: RwLock::new(ProjectionState::default()),
            rebuild_lock: Mutex::new(()),
            invalid: AtomicBool::new(true),
            last_stats: Mutex::new(None),
        }
    }

    pub fn from_path(index_path: impl Into<PathBuf>) -> Self {
        Self::new(IndexSource::File(index_path.into()))
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(IndexSource::Memory(bytes.into()))
    }

    /// Point the projection at new index bytes and mark it invalid.
    pub fn set_source(&self, source: IndexSource) {
        *self.source.write() = source;
        self.invalidate();
    }

    /// Parse the whole index and replace the current projection.
    ///
    /// On failure the previous projection stays in place and remains invalid.
    #[instrument(skip(self))]
    pub fn build(&self) -> Result<BuildStats, ProjectionError> {
        let _guard = self.rebuild_lock.lock();
        let started = Instant::now();
        // Cleared first so an index change arriving mid-build re-invalidates.
        self.invalid.store(false, Ordering::SeqCst);

        let source = self.source.read().clone();
        let result = source.load().and_then(|data| build_projection(&data));
        let (state, stats) = match result {
            Ok(built) => built,
            Err(err) => {
                self.invalid.store(true, Ordering::SeqCst);
                warn!(error = %err, "Projection build failed");
                return Err(err);
            }
        };

        *self.state.write() = state;
        *self.last_stats.lock() = Some(stats);

        info!(
            entries = stats.entries,
            files = stats.files,
            folders = stats.folders,
            skipped_sparse = stats.skipped_sparse,
            conflicts = stats.conflicts,
            parent_lookups = stats.parent_lookups,
            duration_ms = started.elapsed().as_millis() as u64,
            "Projection built"
        );
        Ok(stats)
    }

    pub fn invalidate(&self) {
        debug!("Projection invalidated");
        self.invalid.store(true, Ordering::SeqCst);
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    /// Rebuild only when invalidated since the last successful build.
    pub fn rebuild_if_needed(&self) -> Result<Option<BuildStats>, ProjectionError> {
        if !self.is_invalid() {
            return Ok(None);
        }
        self.build().map(Some)
    }

    pub fn last_build_stats(&self) -> Option<BuildStats> {
        *self.last_stats.lock()
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        let state = self.state.read();
        let Some(id) = state.tree.resolve(path) else {
            return Lookup::NotFound;
        };
        match state.tree.node(id) {
            Some(ProjectedNode::File(file)) => Lookup::File {
                hash: file.hash,
                type_and_mode: file.type_and_mode,
            },
            Some(ProjectedNode::Folder(folder)) => Lookup::Folder {
                enumerated: folder.fully_enumerated,
            },
            None => Lookup::NotFound,
        }
    }

    /// Hash and mode a placeholder for `path` should carry, if it is a file.
    pub fn placeholder_file_data(&self, path: &str) -> Option<(ObjectHash, FileTypeAndMode)> {
        match self.lookup(path) {
            Lookup::File {
                hash,
                type_and_mode,
            } => Some((hash, type_and_mode)),
            _ => None,
        }
    }

    /// Snapshot of a folder's children in case-folded name order.
    pub fn enumerate_children(&self, path: &str) -> Result<Vec<ProjectedFileInfo>, ProjectionError> {
        let state = self.state.read();
        let folder = state
            .tree
            .resolve(path)
            .filter(|id| state.tree.folder(*id).is_some())
            .ok_or_else(|| ProjectionError::NotAFolder(path.to_string()))?;

        Ok(state
            .tree
            .children(folder)
            .map(|(_, node)| ProjectedFileInfo {
                name: node.name().as_str().to_string(),
                kind: match node {
                    ProjectedNode::Folder(_) => ProjectedKind::Folder,
                    ProjectedNode::File(file) => ProjectedKind::File {
                        hash: file.hash,
                        type_and_mode: file.type_and_mode,
                    },
                },
            })
            .collect())
    }

    /// True when `path` is a skip-worktree entry, or a folder that only holds
    /// skip-worktree entries.
    pub fn is_sparse(&self, path: &str) -> bool {
        let folded = fold_case(path.trim_matches('/'));
        let state = self.state.read();
        if state.sparse_files.contains(&folded) {
            return true;
        }
        state.sparse_folders.contains(&folded) && state.tree.resolve(&folded).is_none()
    }

    pub fn conflict(&self, path: &str) -> Option<ConflictEntry> {
        self.state.read().conflicts.get(&fold_case(path)).cloned()
    }

    pub fn conflicted_paths(&self) -> Vec<String> {
        self.state
            .read()
            .conflicts
            .values()
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Add or update a single file without a rebuild. Folders created on the
    /// way are not marked enumerated.
    pub fn add_or_update_file(
        &self,
        path: &str,
        hash: ObjectHash,
        type_and_mode: FileTypeAndMode,
    ) -> Result<(), ProjectionError> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let Some((name, parents)) = segments.split_last() else {
            return Err(ProjectionError::InvalidPath(path.to_string()));
        };

        let _guard = self.rebuild_lock.lock();
        let mut state = self.state.write();
        let parent = find_or_create_folder(&mut state.tree, NodeId::ROOT, parents, false)
            .ok_or_else(|| ProjectionError::InvalidPath(path.to_string()))?;
        state.tree.upsert_file(
            parent,
            FileNode {
                name: Arc::new(PathPart::new(name.as_bytes())),
                hash,
                type_and_mode,
                merge_stage: MergeStage::Normal,
            },
        );
        state.clear_sparse(path);
        debug!(path, "Projection file added");
        Ok(())
    }

    /// Remove a path and prune folders left empty. Returns false if absent.
    pub fn remove_path(&self, path: &str) -> bool {
        let trimmed = path.trim_matches('/');
        let (parent_path, name) = match trimmed.rfind('/') {
            Some(separator) => (&trimmed[..separator], &trimmed[separator + 1..]),
            None => ("", trimmed),
        };
        if name.is_empty() {
            return false;
        }

        let _guard = self.rebuild_lock.lock();
        let mut state = self.state.write();
        let Some(parent) = state.tree.resolve(parent_path) else {
            return false;
        };
        let removed = state.tree.remove_child(parent, &fold_case(name));
        if removed {
            state.tree.prune_empty_folders(parent);
            debug!(path, "Projection path removed");
        }
        removed
    }

    /// Populate a folder that was created incrementally from the index.
    /// Returns the number of entries added, or 0 if already enumerated.
    #[instrument(skip(self))]
    pub fn expand_folder(&self, path: &str) -> Result<usize, ProjectionError> {
        match self.lookup(path) {
            Lookup::Folder { enumerated: true } => return Ok(0),
            Lookup::Folder { enumerated: false } => {}
            _ => return Err(ProjectionError::NotAFolder(path.to_string())),
        }

        let _guard = self.rebuild_lock.lock();
        let data = self.source.read().clone().load()?;
        let mut state = self.state.read().clone();
        let added = expand_from_index(&mut state, &data, path)?;
        *self.state.write() = state;
        debug!(path, added, "Folder expanded");
        Ok(added)
    }
}
