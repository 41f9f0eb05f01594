use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::entities::{
    array_item_key, NodeData, NodeDraft, TreeKind, ValueType, ARRAY_ITEM_PLACEHOLDER,
    DEFAULT_ROOT_KEY, ENVIRONMENTS_ROOT_KEY,
};

/// Tree node in the arena-based configuration tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Editable node payload
    pub data: NodeData,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in display/array order
    pub children: Vec<Index>,
}

/// Arena-based configuration tree.
///
/// Parent links are plain arena indices: the parent owns its children by
/// containment, a child only points back. Every tree has exactly one root.
#[derive(Debug, Clone)]
pub struct TreeArena {
    arena: Arena<TreeNode>,
    root: Index,
    kind: TreeKind,
}

impl TreeArena {
    pub fn new(kind: TreeKind) -> Self {
        let key = match kind {
            TreeKind::Default => DEFAULT_ROOT_KEY,
            TreeKind::Environments => ENVIRONMENTS_ROOT_KEY,
            TreeKind::Detached => "",
        };
        Self::with_root(kind, NodeData::new(key, ValueType::Object))
    }

    pub fn with_root(kind: TreeKind, data: NodeData) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(TreeNode {
            data,
            parent: None,
            children: Vec::new(),
        });
        Self { arena, root, kind }
    }

    pub fn root(&self) -> Index {
        self.root
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_leaf(self.root)
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut TreeNode> {
        self.arena.get_mut(idx)
    }

    pub fn data(&self, idx: Index) -> Option<&NodeData> {
        self.arena.get(idx).map(|n| &n.data)
    }

    pub fn data_mut(&mut self, idx: Index) -> Option<&mut NodeData> {
        self.arena.get_mut(idx).map(|n| &mut n.data)
    }

    pub fn key(&self, idx: Index) -> Option<&str> {
        self.data(idx).map(|d| d.key.as_str())
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.arena.get(idx).and_then(|n| n.parent)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.arena
            .get(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_by_key(&self, idx: Index, key: &str) -> Option<Index> {
        self.children(idx)
            .iter()
            .copied()
            .find(|&c| self.key(c) == Some(key))
    }

    /// A node is a leaf iff it has no children.
    pub fn is_leaf(&self, idx: Index) -> bool {
        self.children(idx).is_empty()
    }

    pub fn is_array(&self, idx: Index) -> bool {
        self.data(idx)
            .map(|d| d.value_type == ValueType::Array)
            .unwrap_or(false)
    }

    pub fn is_default_node(&self, idx: Index) -> bool {
        self.kind == TreeKind::Default && self.contains(idx)
    }

    pub fn is_object_in_array(&self, idx: Index) -> bool {
        let is_object = self
            .data(idx)
            .map(|d| d.value_type == ValueType::Object)
            .unwrap_or(false);
        is_object && self.parent(idx).map(|p| self.is_array(p)).unwrap_or(false)
    }

    /// Declared type shared by the elements of an array node.
    pub fn array_item_type(&self, idx: Index) -> Option<ValueType> {
        if !self.is_array(idx) {
            return None;
        }
        self.children(idx)
            .first()
            .and_then(|&c| self.data(c))
            .map(|d| d.value_type)
    }

    /// Number of ancestors; the root is level 0.
    pub fn level(&self, idx: Index) -> usize {
        let mut level = 0;
        let mut current = self.parent(idx);
        while let Some(p) = current {
            level += 1;
            current = self.parent(p);
        }
        level
    }

    /// Key path from just below the root down to `idx`.
    ///
    /// Elements of arrays contribute the first-element placeholder instead
    /// of their literal position.
    #[instrument(level = "trace", skip(self))]
    pub fn paths_without_root(&self, idx: Index) -> Vec<String> {
        let mut paths = Vec::new();
        let mut current = idx;
        while let Some(parent) = self.parent(current) {
            if self.is_array(parent) {
                paths.push(ARRAY_ITEM_PLACEHOLDER.to_string());
            } else if let Some(key) = self.key(current) {
                paths.push(key.to_string());
            }
            current = parent;
        }
        paths.reverse();
        paths
    }

    /// Literal key path below the root, array positions included.
    pub fn key_path(&self, idx: Index) -> Vec<String> {
        let mut keys = Vec::new();
        let mut current = idx;
        while let Some(parent) = self.parent(current) {
            if let Some(key) = self.key(current) {
                keys.push(key.to_string());
            }
            current = parent;
        }
        keys.reverse();
        keys
    }

    /// Dotted display path including the root key, e.g. `default.db.host`.
    pub fn path_string(&self, idx: Index) -> String {
        let root_key = self.key(self.root).unwrap_or_default();
        let mut out = root_key.to_string();
        for key in self.key_path(idx) {
            if key.starts_with('[') || out.is_empty() {
                out.push_str(&key);
            } else {
                out.push('.');
                out.push_str(&key);
            }
        }
        out
    }

    /// Resolve a path produced by [`paths_without_root`](Self::paths_without_root)
    /// against the descendants of `idx`.
    ///
    /// Returns None when the path does not exist, which is common: override
    /// trees are sparse.
    #[instrument(level = "trace", skip(self))]
    pub fn find_child(&self, idx: Index, paths: &[String]) -> Option<Index> {
        let mut current = idx;
        for segment in paths {
            current = if segment == ARRAY_ITEM_PLACEHOLDER && self.is_array(current) {
                *self.children(current).first()?
            } else {
                self.child_by_key(current, segment)?
            };
        }
        Some(current)
    }

    /// Resolve literal keys (array positions as `[n]`) below `idx`.
    pub fn resolve_keys(&self, idx: Index, keys: &[&str]) -> Option<Index> {
        let mut current = idx;
        for key in keys {
            current = self.child_by_key(current, key)?;
        }
        Some(current)
    }

    /// Append a node as the last child of `parent`.
    #[instrument(level = "trace", skip(self))]
    pub fn add_child(&mut self, parent: Index, data: NodeData) -> Option<Index> {
        if !self.contains(parent) {
            return None;
        }
        let idx = self.arena.insert(TreeNode {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(p) = self.arena.get_mut(parent) {
            p.children.push(idx);
        }
        Some(idx)
    }

    /// Insert a detached subtree as the last child of `parent`.
    pub fn graft(&mut self, parent: Index, draft: NodeDraft) -> Option<Index> {
        let NodeDraft { data, children } = draft;
        let idx = self.add_child(parent, data)?;
        for child in children {
            self.graft(idx, child);
        }
        Some(idx)
    }

    /// Copy the subtree rooted at `idx` out of the arena.
    pub fn extract(&self, idx: Index) -> Option<NodeDraft> {
        let node = self.get_node(idx)?;
        Some(NodeDraft {
            data: node.data.clone(),
            children: node
                .children
                .iter()
                .filter_map(|&c| self.extract(c))
                .collect(),
        })
    }

    /// Copy `idx` into a fresh detached tree as the single child of an
    /// anonymous root.
    pub fn detach_preview(&self, idx: Index) -> Option<TreeArena> {
        let draft = self.extract(idx)?;
        let mut tree = TreeArena::new(TreeKind::Detached);
        let root = tree.root();
        tree.graft(root, draft);
        Some(tree)
    }

    /// Remove every direct child whose key is in `keys`.
    ///
    /// Unmatched keys are ignored. Elements of an array are renumbered
    /// afterwards so positional keys stay unique.
    #[instrument(level = "trace", skip(self, keys))]
    pub fn remove_children<S: AsRef<str>>(&mut self, idx: Index, keys: &[S]) -> usize {
        let doomed: Vec<Index> = self
            .children(idx)
            .iter()
            .copied()
            .filter(|&c| {
                self.key(c)
                    .map(|k| keys.iter().any(|key| key.as_ref() == k))
                    .unwrap_or(false)
            })
            .collect();
        for &child in &doomed {
            self.free_subtree(child);
        }
        if let Some(node) = self.arena.get_mut(idx) {
            node.children.retain(|c| !doomed.contains(c));
        }
        if self.is_array(idx) {
            self.renumber_items(idx);
        }
        doomed.len()
    }

    /// Remove `idx` and its subtree from its parent. The root cannot be removed.
    pub fn remove_node(&mut self, idx: Index) -> bool {
        let Some(parent) = self.parent(idx) else {
            return false;
        };
        self.free_subtree(idx);
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.retain(|&c| c != idx);
        }
        if self.is_array(parent) {
            self.renumber_items(parent);
        }
        true
    }

    /// Drop every child of `idx`.
    pub fn clear_children(&mut self, idx: Index) {
        let children = self.children(idx).to_vec();
        for child in children {
            self.free_subtree(child);
        }
        if let Some(node) = self.arena.get_mut(idx) {
            node.children.clear();
        }
    }

    /// Replace the children of `idx` with the given drafts.
    pub fn replace_children(&mut self, idx: Index, drafts: Vec<NodeDraft>) {
        self.clear_children(idx);
        for draft in drafts {
            self.graft(idx, draft);
        }
    }

    fn free_subtree(&mut self, idx: Index) {
        let children = self.children(idx).to_vec();
        for child in children {
            self.free_subtree(child);
        }
        self.arena.remove(idx);
    }

    fn renumber_items(&mut self, idx: Index) {
        let children = self.children(idx).to_vec();
        for (position, child) in children.into_iter().enumerate() {
            if let Some(data) = self.data_mut(child) {
                data.key = array_item_key(position);
            }
        }
    }

    /// All node indices below and including `idx`, in pre-order.
    pub fn descendants(&self, idx: Index) -> Vec<Index> {
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.calculate_depth(self.root)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if self.contains(node_idx) {
            1 + self
                .children(node_idx)
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Dotted paths of all leaf nodes below the root.
    #[instrument(level = "debug", skip(self))]
    pub fn leaf_nodes(&self) -> Vec<String> {
        self.iter()
            .filter(|(idx, _)| *idx != self.root && self.is_leaf(*idx))
            .map(|(idx, _)| self.path_string(idx))
            .collect()
    }
}

pub struct TreeIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a TreeArena) -> Self {
        Self {
            arena,
            stack: vec![arena.root()],
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a TreeArena) -> Self {
        Self {
            arena,
            stack: vec![(arena.root(), false)],
        }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
