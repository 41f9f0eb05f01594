//! Environment alignment: mirror structural edits of the default tree into
//! every environment's override nodes, and keep references and aliases
//! consistent.
//!
//! Overrides are sparse. An environment without a matching node is simply
//! skipped.

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::configuration::Configuration;
use crate::domain::entities::{Scalar, ValueType};
use crate::domain::variable::VariableSyntax;

/// Run `action` on the override of the default path `paths` in every environment.
///
/// Matches are collected before any action runs, so an action may remove
/// the node it is given.
pub fn align_environment_properties<F>(envs: &mut TreeArena, paths: &[String], mut action: F) -> usize
where
    F: FnMut(&mut TreeArena, Index),
{
    if paths.is_empty() {
        return 0;
    }
    let found: Vec<Index> = envs
        .children(envs.root())
        .iter()
        .filter_map(|&env| envs.find_child(env, paths))
        .collect();
    for &idx in &found {
        action(envs, idx);
    }
    found.len()
}

/// The value type of the default node `idx` is about to change: drop every
/// override at its path. A former array also loses its stale items.
#[instrument(level = "debug", skip(config))]
pub fn align_type_change(config: &mut Configuration, idx: Index) -> usize {
    let paths = config.default.paths_without_root(idx);
    let removed = align_environment_properties(&mut config.environments, &paths, |envs, found| {
        envs.remove_node(found);
    });
    if config.default.is_array(idx) {
        config.default.clear_children(idx);
    }
    debug!("align_type_change: removed {} overrides at {:?}", removed, paths);
    removed
}

/// The default node `idx` is renamed to `new_key`: rename its overrides in
/// place and rewrite variable references across both trees.
///
/// Must run before the live node's key changes.
#[instrument(level = "debug", skip(config, syntax))]
pub fn align_key_rename(
    config: &mut Configuration,
    idx: Index,
    new_key: &str,
    syntax: &VariableSyntax,
) -> usize {
    let Some(old_key) = config.default.key(idx).map(str::to_string) else {
        return 0;
    };
    let paths = config.default.paths_without_root(idx);
    let renamed = align_environment_properties(&mut config.environments, &paths, |envs, found| {
        if let Some(data) = envs.data_mut(found) {
            data.key = new_key.to_string();
        }
    });

    let default_root = config.default.root();
    let env_root = config.environments.root();
    let rewritten = rename_references(&mut config.default, default_root, &old_key, new_key, syntax)
        + rename_references(&mut config.environments, env_root, &old_key, new_key, syntax);
    debug!(
        "align_key_rename: {} -> {}: {} overrides renamed, {} values rewritten",
        old_key, new_key, renamed, rewritten
    );
    renamed
}

/// Rewrite references to `old` into references to `new` in every string
/// leaf below `idx`. Returns the number of values changed.
pub fn rename_references(
    tree: &mut TreeArena,
    idx: Index,
    old: &str,
    new: &str,
    syntax: &VariableSyntax,
) -> usize {
    let mut changed = 0;
    for node in tree.descendants(idx) {
        if !tree.is_leaf(node) {
            continue;
        }
        let Some(data) = tree.data_mut(node) else {
            continue;
        };
        if data.value_type != ValueType::String {
            continue;
        }
        if let Some(Scalar::String(value)) = &data.value {
            if let Some(rewritten) = syntax.rename_reference(value, old, new) {
                data.value = Some(Scalar::String(rewritten));
                changed += 1;
            }
        }
    }
    changed
}

/// Replace alias entry `old` with `new` on every node of `tree`, keeping
/// the other entries and their order.
pub fn rename_alias(tree: &mut TreeArena, old: &str, new: &str) -> usize {
    let mut changed = 0;
    for node in tree.descendants(tree.root()) {
        let Some(data) = tree.data_mut(node) else {
            continue;
        };
        if !data.has_alias(old) {
            continue;
        }
        let already_has_new = data.has_alias(new);
        let mut aliases = Vec::with_capacity(data.aliases.len());
        for alias in data.aliases.drain(..) {
            if alias == old {
                if !already_has_new {
                    aliases.push(new.to_string());
                }
            } else {
                aliases.push(alias);
            }
        }
        data.aliases = aliases;
        changed += 1;
    }
    changed
}

/// Strip alias entry `name` from every node of `tree`.
pub fn remove_alias(tree: &mut TreeArena, name: &str) -> usize {
    let mut changed = 0;
    for node in tree.descendants(tree.root()) {
        if let Some(data) = tree.data_mut(node) {
            let before = data.aliases.len();
            data.aliases.retain(|a| a != name);
            if data.aliases.len() != before {
                changed += 1;
            }
        }
    }
    changed
}

/// Anchor `old` was renamed to `new`: follow in both trees.
pub fn align_anchor_rename(config: &mut Configuration, old: &str, new: &str) -> usize {
    let changed = rename_alias(&mut config.environments, old, new)
        + rename_alias(&mut config.default, old, new);
    debug!("align_anchor_rename: {} -> {}: {} nodes", old, new, changed);
    changed
}

/// Anchor `name` no longer exists: strip it from every alias list.
pub fn align_anchor_removal(config: &mut Configuration, name: &str) -> usize {
    let changed =
        remove_alias(&mut config.environments, name) + remove_alias(&mut config.default, name);
    debug!("align_anchor_removal: {}: {} nodes", name, changed);
    changed
}

/// A default node at `paths` was deleted: remove its override from every
/// environment.
pub fn align_deletion(config: &mut Configuration, paths: &[String]) -> usize {
    let removed = align_environment_properties(&mut config.environments, paths, |envs, found| {
        envs.remove_node(found);
    });
    debug!("align_deletion: removed {} overrides at {:?}", removed, paths);
    removed
}
