//! Replays parsed index records into a [`ProjectionTree`].

use crate::error::ProjectionError;
use crate::index::{
    fold_case, IndexParser, InternedParts, ParsedIndexEntry, PartMaterializer, PathPart,
    PlainParts,
};
use crate::projection::tree::{FileNode, NodeId, ProjectionTree};
use crate::projection::ConflictEntry;
use crate::types::{MergeStage, ObjectHash};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Counters collected while building a projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub entries: usize,
    pub files: usize,
    pub folders: usize,
    pub skipped_sparse: usize,
    pub conflicts: usize,
    /// Number of times a parent folder had to be located by descending from
    /// the root instead of being reused from the previous record.
    pub parent_lookups: usize,
}

/// Everything derived from one pass over the index.
#[derive(Debug, Clone, Default)]
pub struct ProjectionState {
    pub tree: ProjectionTree,
    /// Case-folded paths of skip-worktree entries.
    pub sparse_files: FxHashSet<String>,
    /// Case-folded ancestors of skip-worktree entries.
    pub sparse_folders: FxHashSet<String>,
    /// Conflicts keyed by case-folded path.
    pub conflicts: BTreeMap<String, ConflictEntry>,
}

impl ProjectionState {
    pub fn record_sparse(&mut self, path: &str) {
        let folded = fold_case(path);
        let mut end = folded.len();
        while let Some(separator) = folded[..end].rfind('/') {
            if !self.sparse_folders.insert(folded[..separator].to_string()) {
                break;
            }
            end = separator;
        }
        self.sparse_files.insert(folded);
    }

    pub fn clear_sparse(&mut self, path: &str) {
        self.sparse_files.remove(&fold_case(path));
    }

    pub fn record_conflict(&mut self, path: &str, stage: MergeStage, hash: ObjectHash) {
        let entry = self
            .conflicts
            .entry(fold_case(path))
            .or_insert_with(|| ConflictEntry {
                path: path.to_string(),
                ..ConflictEntry::default()
            });
        match stage {
            MergeStage::Base => entry.base = Some(hash),
            MergeStage::Ours => entry.ours = Some(hash),
            MergeStage::Theirs => entry.theirs = Some(hash),
            MergeStage::Normal => {}
        }
    }
}

/// Part types that can be turned into shared tree names.
pub trait IntoTreeName {
    fn tree_name(&self) -> Arc<PathPart>;
}

impl IntoTreeName for Arc<PathPart> {
    fn tree_name(&self) -> Arc<PathPart> {
        Arc::clone(self)
    }
}

impl IntoTreeName for String {
    fn tree_name(&self) -> Arc<PathPart> {
        Arc::new(PathPart::new(self.as_bytes()))
    }
}

/// Descend from `start`, creating any missing folders along `parts`.
pub fn find_or_create_folder<P: IntoTreeName>(
    tree: &mut ProjectionTree,
    start: NodeId,
    parts: &[P],
    fully_enumerated: bool,
) -> Option<NodeId> {
    let mut current = start;
    for part in parts {
        let name = part.tree_name();
        current = tree.get_or_create_folder(current, &name, fully_enumerated)?;
        if fully_enumerated {
            tree.set_fully_enumerated(current, true);
        }
    }
    Some(current)
}

/// Add the record currently held by `entry` to `state`.
///
/// The parent folder is reused from the previous record when the parser
/// reports an unchanged parent; otherwise it is located from the root.
fn apply_entry<M>(
    state: &mut ProjectionState,
    entry: &mut ParsedIndexEntry<M>,
    stats: &mut BuildStats,
    enumerated: bool,
) -> Result<(), ProjectionError>
where
    M: PartMaterializer,
    M::Part: IntoTreeName,
{
    if entry.path_length() == 0 {
        return Err(ProjectionError::InvalidPath(String::new()));
    }

    if entry.skip_worktree {
        state.record_sparse(&entry.relative_path('/'));
        stats.skipped_sparse += 1;
        return Ok(());
    }

    if entry.merge_stage.is_conflict() {
        state.record_conflict(&entry.relative_path('/'), entry.merge_stage, entry.hash);
    }

    let parent = match (entry.has_same_parent_as_last_entry(), entry.last_parent()) {
        (true, Some(parent)) => parent,
        _ => {
            stats.parent_lookups += 1;
            let parent =
                find_or_create_folder(&mut state.tree, NodeId::ROOT, entry.parent_parts(), enumerated)
                    .ok_or_else(|| ProjectionError::InvalidPath(entry.relative_path('/')))?;
            entry.set_last_parent(parent);
            parent
        }
    };

    let Some(name) = entry.child_name().map(IntoTreeName::tree_name) else {
        return Ok(());
    };
    trace!(name = %name, "Projecting file");
    state.tree.upsert_file(
        parent,
        FileNode {
            name,
            hash: entry.hash,
            type_and_mode: entry.type_and_mode,
            merge_stage: entry.merge_stage,
        },
    );
    Ok(())
}

/// Build a complete projection from an index buffer.
pub fn build_projection(data: &[u8]) -> Result<(ProjectionState, BuildStats), ProjectionError> {
    let mut parser = IndexParser::new(data)?;
    let mut entry = ParsedIndexEntry::new(InternedParts::new());
    let mut state = ProjectionState::default();
    let mut stats = BuildStats::default();

    while parser.read_next(&mut entry)? {
        stats.entries += 1;
        apply_entry(&mut state, &mut entry, &mut stats, true)?;
    }

    stats.files = state.tree.file_count();
    stats.folders = state.tree.folder_count();
    stats.conflicts = state.conflicts.len();
    Ok((state, stats))
}

/// Add every non-sparse record below `folder_path` to `state`, using the
/// plain-string parser, then mark that folder's subtree enumerated.
/// Returns the number of records applied.
pub fn expand_from_index(
    state: &mut ProjectionState,
    data: &[u8],
    folder_path: &str,
) -> Result<usize, ProjectionError> {
    let prefix = format!("{}/", fold_case(folder_path.trim_matches('/')));
    let mut parser = IndexParser::new(data)?;
    let mut entry = ParsedIndexEntry::new(PlainParts);
    let mut stats = BuildStats::default();
    let mut applied = 0;

    while parser.read_next(&mut entry)? {
        let path = entry.relative_path('/');
        if !fold_case(&path).starts_with(&prefix) {
            entry.clear_last_parent();
            continue;
        }
        if !entry.skip_worktree {
            applied += 1;
        }
        apply_entry(state, &mut entry, &mut stats, false)?;
    }

    if let Some(folder) = state.tree.resolve(folder_path) {
        state.tree.mark_subtree_enumerated(folder);
    }
    Ok(applied)
}
