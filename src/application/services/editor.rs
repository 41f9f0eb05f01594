//! Add/edit/delete protocol over the tree pair.
//!
//! A session is `Idle` until a property is composed; `commit` or `cancel`
//! returns it to `Idle`. Every mutation keeps the default and environment
//! trees aligned before returning.

use std::collections::HashSet;

use generational_arena::Index;
use tracing::{debug, info, instrument};

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::alignment::{
    align_anchor_removal, align_anchor_rename, align_deletion, align_key_rename,
    align_type_change,
};
use crate::domain::{
    array_item_key, key_options, Configuration, DomainError, KeyOption, NodeDraft, NodeRef,
    TreeKind, ValueType, VariableSyntax,
};
use crate::infrastructure::traits::Confirmer;

/// Candidate property descriptor handed to the property editor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigProperty {
    pub edit_mode: bool,
    pub env_file_mode: bool,
    pub key_options: Vec<KeyOption>,
    /// Node being edited, or parent the new property is added to
    pub node: NodeRef,
    /// Root of the default tree, for previewing inherited defaults
    pub default_root: Index,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Composing(ConfigProperty),
}

/// Exclusive owner of a tree pair while it is being edited.
#[derive(Debug)]
pub struct EditSession {
    config: Configuration,
    syntax: VariableSyntax,
    environments: Vec<String>,
    env_file_mode: bool,
    state: SessionState,
    expanded: HashSet<NodeRef>,
}

impl EditSession {
    pub fn new(config: Configuration, syntax: VariableSyntax, environments: Vec<String>) -> Self {
        Self {
            config,
            syntax,
            environments,
            env_file_mode: false,
            state: SessionState::Idle,
            expanded: HashSet::new(),
        }
    }

    /// Editing the environments definition file: environment names are
    /// free-form instead of offered from the known list.
    pub fn with_env_file_mode(mut self, env_file_mode: bool) -> Self {
        self.env_file_mode = env_file_mode;
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn into_configuration(self) -> Configuration {
        self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_expanded(&self, node: NodeRef) -> bool {
        self.expanded.contains(&node)
    }

    pub fn expand(&mut self, node: NodeRef) {
        if self.config.contains(node) {
            self.expanded.insert(node);
        }
    }

    pub fn collapse(&mut self, node: NodeRef) {
        self.expanded.remove(&node);
    }

    /// Start adding below `node` (`edit_mode == false`) or editing `node`.
    #[instrument(level = "debug", skip(self))]
    pub fn compose(&mut self, node: NodeRef, edit_mode: bool) -> ApplicationResult<&ConfigProperty> {
        if !self.config.contains(node) {
            return Err(DomainError::NodeNotFound(format!("{:?}", node)).into());
        }
        let property = ConfigProperty {
            edit_mode,
            env_file_mode: self.env_file_mode,
            key_options: key_options(
                &self.config,
                node,
                edit_mode,
                self.env_file_mode,
                &self.environments,
            ),
            node,
            default_root: self.config.default.root(),
        };
        debug!(
            "compose: {} edit_mode={} options={}",
            self.config.path_string(node),
            edit_mode,
            property.key_options.len()
        );
        self.state = SessionState::Composing(property);
        match &self.state {
            SessionState::Composing(property) => Ok(property),
            SessionState::Idle => Err(DomainError::NotComposing.into()),
        }
    }

    /// Discard the candidate without touching the trees.
    pub fn cancel(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Apply `draft` to the composed target.
    ///
    /// On error nothing is mutated and the session stays in `Composing`.
    #[instrument(level = "debug", skip(self, draft), fields(key = %draft.data.key))]
    pub fn commit(&mut self, draft: NodeDraft) -> ApplicationResult<NodeRef> {
        let property = match &self.state {
            SessionState::Composing(property) => property.clone(),
            SessionState::Idle => return Err(DomainError::NotComposing.into()),
        };
        let node = if property.edit_mode {
            self.commit_edit(property.node, draft)?
        } else {
            self.commit_add(property.node, draft)?
        };
        self.expanded.insert(property.node);
        self.expanded.insert(node);
        self.refresh();
        self.cancel();
        Ok(node)
    }

    fn commit_add(&mut self, parent: NodeRef, mut draft: NodeDraft) -> ApplicationResult<NodeRef> {
        let path = self.config.path_string(parent);
        let tree = self
            .config
            .tree_mut(parent.tree)
            .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
        let parent_type = tree
            .data(parent.index)
            .map(|d| d.value_type)
            .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
        if !parent_type.is_container() {
            return Err(DomainError::NotAContainer(path).into());
        }

        if tree.is_array(parent.index) {
            draft.data.key = array_item_key(tree.children(parent.index).len());
        } else if tree.child_by_key(parent.index, &draft.data.key).is_some() {
            return Err(DomainError::DuplicateKey {
                key: draft.data.key,
                parent: path,
            }
            .into());
        }
        sanitize(&mut draft)?;

        let key = draft.data.key.clone();
        let idx = tree
            .graft(parent.index, draft)
            .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
        info!("added {} under {}", key, path);
        Ok(NodeRef::new(parent.tree, idx))
    }

    fn commit_edit(&mut self, node: NodeRef, mut draft: NodeDraft) -> ApplicationResult<NodeRef> {
        let path = self.config.path_string(node);
        let (live, parent) = {
            let tree = self
                .config
                .tree(node.tree)
                .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
            let live = tree
                .data(node.index)
                .cloned()
                .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
            let parent = tree.parent(node.index);

            // Positional keys of array elements are not user-editable.
            if parent.map(|p| tree.is_array(p)).unwrap_or(false) {
                draft.data.key = live.key.clone();
            }
            if parent.is_none() {
                draft.data.key = live.key.clone();
                draft.data.value_type = live.value_type;
            }
            if draft.data.key != live.key {
                if let Some(parent) = parent {
                    if tree.child_by_key(parent, &draft.data.key).is_some() {
                        return Err(DomainError::DuplicateKey {
                            key: draft.data.key,
                            parent: tree.path_string(parent),
                        }
                        .into());
                    }
                }
            }
            (live, parent)
        };

        if node.tree != TreeKind::Default {
            // Overrides cannot change the schema type.
            draft.data.value_type = live.value_type;
        }
        sanitize(&mut draft)?;

        if node.tree == TreeKind::Default && parent.is_some() {
            if live.value_type != draft.data.value_type {
                align_type_change(&mut self.config, node.index);
            } else if live.key != draft.data.key {
                align_key_rename(&mut self.config, node.index, &draft.data.key, &self.syntax);
            }
        }

        let NodeDraft { data, children } = draft;
        let new_anchor = data.anchor.clone();
        let value_type = data.value_type;
        let tree = self
            .config
            .tree_mut(node.tree)
            .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
        if let Some(live_data) = tree.data_mut(node.index) {
            *live_data = data;
        }
        if !value_type.is_container() {
            tree.clear_children(node.index);
        } else if !children.is_empty() {
            tree.replace_children(node.index, children);
        }

        match (live.anchor.as_deref(), new_anchor.as_deref()) {
            (Some(old), Some(new)) if old != new => {
                align_anchor_rename(&mut self.config, old, new);
            }
            (Some(old), None) => {
                align_anchor_removal(&mut self.config, old);
            }
            _ => {}
        }
        info!("edited {}", path);
        Ok(node)
    }

    /// Ask for confirmation, then delete `node`. Returns whether it was deleted.
    pub fn delete(&mut self, node: NodeRef, confirmer: &dyn Confirmer) -> ApplicationResult<bool> {
        let is_environment = node.tree == TreeKind::Environments
            && self
                .config
                .tree(node.tree)
                .map(|t| t.level(node.index) == 1)
                .unwrap_or(false);
        let message = format!(
            "Are you sure you want to delete this {}?",
            if is_environment { "environment" } else { "property" }
        );
        let confirmed = confirmer
            .confirm(&message)
            .with_context("confirmation dialog")?;
        if !confirmed {
            debug!("delete: declined for {}", self.config.path_string(node));
            return Ok(false);
        }
        self.do_delete(node)?;
        self.refresh();
        self.cancel();
        Ok(true)
    }

    /// Remove `node` from its parent and realign the tree pair.
    #[instrument(level = "debug", skip(self))]
    pub fn do_delete(&mut self, node: NodeRef) -> ApplicationResult<()> {
        let path = self.config.path_string(node);
        let tree = self
            .config
            .tree_mut(node.tree)
            .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
        let data = tree
            .data(node.index)
            .cloned()
            .ok_or_else(|| DomainError::NodeNotFound(path.clone()))?;
        let parent = tree
            .parent(node.index)
            .ok_or_else(|| DomainError::CannotDeleteRoot(path.clone()))?;
        let parent_is_array = tree.is_array(parent);
        let paths = tree.paths_without_root(node.index);
        tree.remove_node(node.index);

        if let Some(anchor) = &data.anchor {
            align_anchor_removal(&mut self.config, anchor);
        }
        if node.tree == TreeKind::Default && !parent_is_array {
            align_deletion(&mut self.config, &paths);
        }
        info!("deleted {}", path);
        Ok(())
    }

    /// Drop view state for nodes that no longer exist.
    pub fn refresh(&mut self) {
        let config = &self.config;
        self.expanded.retain(|&node| config.contains(node));
        let stale = matches!(
            &self.state,
            SessionState::Composing(property) if !self.config.contains(property.node)
        );
        if stale {
            self.state = SessionState::Idle;
        }
    }
}

/// Containers carry no scalar value; scalar values must match the type.
fn sanitize(draft: &mut NodeDraft) -> ApplicationResult<()> {
    let value_type = draft.data.value_type;
    if value_type.is_container() {
        draft.data.value = None;
        if value_type == ValueType::Array {
            for (position, item) in draft.children.iter_mut().enumerate() {
                item.data.key = array_item_key(position);
            }
        }
        return Ok(());
    }
    draft.children.clear();
    if let Some(value) = &draft.data.value {
        if value.value_type() != value_type {
            return Err(DomainError::TypeMismatch {
                value: value.to_string(),
                value_type: value_type.to_string(),
            }
            .into());
        }
    }
    Ok(())
}
