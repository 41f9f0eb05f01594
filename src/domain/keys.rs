//! Key options offered when adding or editing a property.
//!
//! Environment trees mirror the default schema: the options are derived
//! from the structurally corresponding default node, so a user can neither
//! create a duplicate key nor diverge an override's type.

use tracing::debug;

use crate::domain::configuration::Configuration;
use crate::domain::entities::{
    array_item_key, KeyOption, NodeRef, TreeKind, ValueType, ARRAY_ITEM_PLACEHOLDER,
    INHERITS_KEY,
};

/// Candidate `{key, type}` pairs for the property flow on `node`.
///
/// * `edit_mode` - editing `node` itself rather than adding below it
/// * `env_file_mode` - editing the environments definition file, where
///   environment names are free-form
/// * `environments` - known environment names
///
/// Default-tree nodes take free-form keys and yield no options.
pub fn key_options(
    config: &Configuration,
    node: NodeRef,
    edit_mode: bool,
    env_file_mode: bool,
    environments: &[String],
) -> Vec<KeyOption> {
    if node.tree != TreeKind::Environments {
        return Vec::new();
    }
    let envs = &config.environments;
    let Some(data) = envs.data(node.index) else {
        return Vec::new();
    };

    if edit_mode {
        return vec![KeyOption::new(data.key.clone(), data.value_type)];
    }

    let existing: Vec<&str> = envs
        .children(node.index)
        .iter()
        .filter_map(|&c| envs.key(c))
        .collect();

    let level = envs.level(node.index);
    if level == 0 {
        if env_file_mode {
            return Vec::new();
        }
        return environments
            .iter()
            .filter(|name| !existing.contains(&name.as_str()))
            .map(|name| KeyOption::new(name.clone(), ValueType::Object))
            .collect();
    }

    if envs.is_array(node.index) {
        let item_type = envs
            .array_item_type(node.index)
            .unwrap_or(ValueType::String);
        return vec![KeyOption::new(
            array_item_key(envs.children(node.index).len()),
            item_type,
        )];
    }

    let mut options = Vec::new();
    if level == 1 && !existing.contains(&INHERITS_KEY) {
        options.push(KeyOption::new(INHERITS_KEY, ValueType::String));
    }

    // Walk up to the environment root, translating ancestors into a
    // default-tree path.
    let mut hierarchy = Vec::new();
    let mut current = Some(node.index);
    while let Some(idx) = current {
        if envs.level(idx) <= 1 {
            break;
        }
        let in_array = envs.parent(idx).map(|p| envs.is_array(p)).unwrap_or(false);
        if in_array {
            hierarchy.push(ARRAY_ITEM_PLACEHOLDER.to_string());
        } else if let Some(key) = envs.key(idx) {
            hierarchy.push(key.to_string());
        }
        current = envs.parent(idx);
    }
    hierarchy.reverse();
    debug!("key_options: default path {:?}", hierarchy);

    let default = &config.default;
    if let Some(default_node) = default.find_child(default.root(), &hierarchy) {
        for &child in default.children(default_node) {
            if let Some(child_data) = default.data(child) {
                if !existing.contains(&child_data.key.as_str()) {
                    options.push(KeyOption::new(
                        child_data.key.clone(),
                        child_data.value_type,
                    ));
                }
            }
        }
    }
    options
}
