//! Arena-backed projection tree
//!
//! Folders and files live in a single slot vector addressed by [`NodeId`].
//! Freed slots go on a free list and are reused by later inserts. A folder's
//! parent link is a plain handle into the same arena, so there are no
//! ownership cycles; it is only used to walk back up when pruning.

use crate::index::path_part::{fold_case, PathPart};
use crate::types::{FileTypeAndMode, MergeStage, ObjectHash};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Handle to a node in a [`ProjectionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct FolderNode {
    pub name: Arc<PathPart>,
    pub parent: Option<NodeId>,
    /// Children keyed by case-folded name, so two names differing only by
    /// case can never both be present.
    pub children: BTreeMap<Box<str>, NodeId>,
    /// True when every child from the index is known to be present.
    pub fully_enumerated: bool,
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: Arc<PathPart>,
    pub hash: ObjectHash,
    pub type_and_mode: FileTypeAndMode,
    pub merge_stage: MergeStage,
}

#[derive(Debug, Clone)]
pub enum ProjectedNode {
    Folder(FolderNode),
    File(FileNode),
}

impl ProjectedNode {
    pub fn name(&self) -> &Arc<PathPart> {
        match self {
            ProjectedNode::Folder(folder) => &folder.name,
            ProjectedNode::File(file) => &file.name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, ProjectedNode::Folder(_))
    }
}

/// In-memory model of the expected working tree.
#[derive(Debug, Clone)]
pub struct ProjectionTree {
    nodes: Vec<Option<ProjectedNode>>,
    free: Vec<u32>,
    files: usize,
    folders: usize,
}

impl Default for ProjectionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionTree {
    pub fn new() -> Self {
        let root = FolderNode {
            name: Arc::new(PathPart::new(b"")),
            parent: None,
            children: BTreeMap::new(),
            fully_enumerated: true,
        };
        Self {
            nodes: vec![Some(ProjectedNode::Folder(root))],
            free: Vec::new(),
            files: 0,
            folders: 0,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Number of folders, not counting the root.
    pub fn folder_count(&self) -> usize {
        self.folders
    }

    pub fn node(&self, id: NodeId) -> Option<&ProjectedNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn folder(&self, id: NodeId) -> Option<&FolderNode> {
        match self.node(id) {
            Some(ProjectedNode::Folder(folder)) => Some(folder),
            _ => None,
        }
    }

    fn folder_mut(&mut self, id: NodeId) -> Option<&mut FolderNode> {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(ProjectedNode::Folder(folder)) => Some(folder),
            _ => None,
        }
    }

    pub fn set_fully_enumerated(&mut self, id: NodeId, value: bool) {
        if let Some(folder) = self.folder_mut(id) {
            folder.fully_enumerated = value;
        }
    }

    /// Mark `id` and every folder below it as fully enumerated.
    pub fn mark_subtree_enumerated(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(folder) = self.folder_mut(current) {
                folder.fully_enumerated = true;
                pending.extend(folder.children.values().copied());
            }
        }
    }

    pub fn find_child(&self, parent: NodeId, folded_name: &str) -> Option<NodeId> {
        self.folder(parent)?.children.get(folded_name).copied()
    }

    /// Resolve a `/`-separated relative path. The empty path is the root.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        let mut current = NodeId::ROOT;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.find_child(current, &fold_case(segment))?;
        }
        Some(current)
    }

    /// Return the child folder called `name`, creating it if needed.
    ///
    /// A file already occupying that name is replaced: entries below a path
    /// always take precedence over an entry at that path.
    pub fn get_or_create_folder(
        &mut self,
        parent: NodeId,
        name: &Arc<PathPart>,
        fully_enumerated: bool,
    ) -> Option<NodeId> {
        let key = name.folded();
        match self.find_child(parent, key) {
            Some(existing) if self.folder(existing).is_some() => return Some(existing),
            Some(existing) => {
                debug!(name = %name, "Replacing file with folder of the same name");
                self.detach(parent, key);
                self.free_subtree(existing);
            }
            None => {}
        }

        let folder = FolderNode {
            name: Arc::clone(name),
            parent: Some(parent),
            children: BTreeMap::new(),
            fully_enumerated,
        };
        let id = self.allocate(ProjectedNode::Folder(folder));
        self.folders += 1;
        self.folder_mut(parent)?.children.insert(key.into(), id);
        Some(id)
    }

    /// Add or replace a file under `parent`.
    ///
    /// An existing file is only replaced by an entry whose merge stage has at
    /// least the same precedence. Returns `None` when the name is taken by a
    /// folder or the file was not replaced.
    pub fn upsert_file(&mut self, parent: NodeId, file: FileNode) -> Option<NodeId> {
        let key: Box<str> = file.name.folded().into();
        if let Some(existing) = self.find_child(parent, &key) {
            return match self.nodes.get_mut(existing.index()).and_then(Option::as_mut) {
                Some(ProjectedNode::File(current))
                    if file.merge_stage.precedence() >= current.merge_stage.precedence() =>
                {
                    current.hash = file.hash;
                    current.type_and_mode = file.type_and_mode;
                    current.merge_stage = file.merge_stage;
                    Some(existing)
                }
                _ => None,
            };
        }

        self.folder(parent)?;
        let id = self.allocate(ProjectedNode::File(file));
        self.files += 1;
        self.folder_mut(parent)?.children.insert(key, id);
        Some(id)
    }

    /// Remove a child and its whole subtree. Returns false if it was absent.
    pub fn remove_child(&mut self, parent: NodeId, folded_name: &str) -> bool {
        match self.detach(parent, folded_name) {
            Some(child) => {
                self.free_subtree(child);
                true
            }
            None => false,
        }
    }

    /// Remove empty folders starting at `folder` and walking up parent links.
    pub fn prune_empty_folders(&mut self, mut folder: NodeId) {
        while folder != NodeId::ROOT {
            let (parent, key) = match self.folder(folder) {
                Some(node) if node.children.is_empty() => match node.parent {
                    Some(parent) => (parent, Box::<str>::from(node.name.folded())),
                    None => return,
                },
                _ => return,
            };
            self.remove_child(parent, &key);
            folder = parent;
        }
    }

    /// Children of a folder, ordered by case-folded name.
    pub fn children(&self, folder: NodeId) -> impl Iterator<Item = (NodeId, &ProjectedNode)> {
        self.folder(folder)
            .into_iter()
            .flat_map(|f| f.children.values())
            .filter_map(move |id| self.node(*id).map(|node| (*id, node)))
    }

    /// Relative path of a node, rebuilt from parent links. Files carry no
    /// parent link, so only folder paths are complete.
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == NodeId::ROOT {
                break;
            }
            let node = self.node(node_id)?;
            names.push(node.name().as_str().to_string());
            current = match node {
                ProjectedNode::Folder(folder) => folder.parent,
                ProjectedNode::File(_) => None,
            };
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Visit every node depth-first in child order with its full path.
    /// Uses one reusable path buffer.
    pub fn visit(&self, mut f: impl FnMut(&str, &ProjectedNode)) {
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        let mut path = String::new();
        for (id, _) in self.children(NodeId::ROOT).collect::<Vec<_>>().into_iter().rev() {
            stack.push((id, 0));
        }

        while let Some((id, base_len)) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            path.truncate(base_len);
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(node.name().as_str());
            f(&path, node);

            if node.is_folder() {
                let current_len = path.len();
                let children: Vec<NodeId> = self.children(id).map(|(child, _)| child).collect();
                for child in children.into_iter().rev() {
                    stack.push((child, current_len));
                }
            }
        }
    }

    fn detach(&mut self, parent: NodeId, folded_name: &str) -> Option<NodeId> {
        self.folder_mut(parent)?.children.remove(folded_name)
    }

    fn allocate(&mut self, node: ProjectedNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if current == NodeId::ROOT {
                continue;
            }
            match self.nodes.get_mut(current.index()).and_then(Option::take) {
                Some(ProjectedNode::Folder(folder)) => {
                    self.folders -= 1;
                    pending.extend(folder.children.into_values());
                }
                Some(ProjectedNode::File(_)) => self.files -= 1,
                None => continue,
            }
            self.free.push(current.0);
        }
    }
}
