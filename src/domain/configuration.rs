//! The tree pair: default configuration plus environment overrides.

use generational_arena::Index;

use crate::domain::arena::{TreeArena, TreeNode};
use crate::domain::entities::{
    NodeData, NodeRef, TreeKind, DEFAULT_ROOT_KEY, ENVIRONMENTS_ROOT_KEY,
};
use crate::domain::error::{DomainError, DomainResult};

/// Default tree and environments tree, held side by side.
///
/// The direct children of the environments root are the environment
/// sub-trees; each mirrors the shape of the default tree sparsely.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub default: TreeArena,
    pub environments: TreeArena,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            default: TreeArena::new(TreeKind::Default),
            environments: TreeArena::new(TreeKind::Environments),
        }
    }

    pub fn tree(&self, kind: TreeKind) -> Option<&TreeArena> {
        match kind {
            TreeKind::Default => Some(&self.default),
            TreeKind::Environments => Some(&self.environments),
            TreeKind::Detached => None,
        }
    }

    pub fn tree_mut(&mut self, kind: TreeKind) -> Option<&mut TreeArena> {
        match kind {
            TreeKind::Default => Some(&mut self.default),
            TreeKind::Environments => Some(&mut self.environments),
            TreeKind::Detached => None,
        }
    }

    pub fn default_root(&self) -> NodeRef {
        NodeRef::new(TreeKind::Default, self.default.root())
    }

    pub fn environments_root(&self) -> NodeRef {
        NodeRef::new(TreeKind::Environments, self.environments.root())
    }

    pub fn node(&self, node: NodeRef) -> Option<&TreeNode> {
        self.tree(node.tree)?.get_node(node.index)
    }

    pub fn data(&self, node: NodeRef) -> Option<&NodeData> {
        self.node(node).map(|n| &n.data)
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.node(node).is_some()
    }

    /// Names of the environments, in tree order.
    pub fn environment_names(&self) -> Vec<String> {
        let envs = &self.environments;
        envs.children(envs.root())
            .iter()
            .filter_map(|&c| envs.key(c).map(str::to_string))
            .collect()
    }

    /// Root node of the named environment sub-tree.
    pub fn environment(&self, name: &str) -> Option<Index> {
        self.environments.child_by_key(self.environments.root(), name)
    }

    /// Display path of a node, e.g. `environments.prod.db.host`.
    pub fn path_string(&self, node: NodeRef) -> String {
        self.tree(node.tree)
            .map(|t| t.path_string(node.index))
            .unwrap_or_default()
    }

    /// Resolve a dotted path such as `default.db.host`,
    /// `environments.prod.servers[0].name` or `environments.prod.servers.[0]`.
    pub fn resolve_path(&self, path: &str) -> DomainResult<NodeRef> {
        let segments = split_path(path);
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| DomainError::NodeNotFound(path.to_string()))?;
        let tree = match first.as_str() {
            DEFAULT_ROOT_KEY => &self.default,
            ENVIRONMENTS_ROOT_KEY => &self.environments,
            _ => return Err(DomainError::NodeNotFound(path.to_string())),
        };
        let keys: Vec<&str> = rest.iter().map(String::as_str).collect();
        tree.resolve_keys(tree.root(), &keys)
            .map(|idx| NodeRef::new(tree.kind(), idx))
            .ok_or_else(|| DomainError::NodeNotFound(path.to_string()))
    }
}

/// Split a dotted path into keys, separating `name[0]` into `name` and `[0]`.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let mut rest = part;
        while let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(rest[..open].to_string());
            }
            match rest[open..].find(']') {
                Some(close) => {
                    segments.push(rest[open..open + close + 1].to_string());
                    rest = &rest[open + close + 1..];
                }
                None => {
                    segments.push(rest[open..].to_string());
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            segments.push(rest.to_string());
        }
    }
    segments
}
