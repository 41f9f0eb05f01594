//! Environment compilation: inheritance, layered merge, alias expansion and
//! variable substitution.
//!
//! Layers are applied in order `default`, then the root-most inherited
//! environment down to the target. Objects merge key by key; scalars keep a
//! history of their values per layer so that `${host}` inside an override
//! of `host` can refer to the value it shadows. Aliases are expanded against
//! the merged document, after the last layer.

use std::collections::{HashMap, HashSet};

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::configuration::Configuration;
use crate::domain::entities::{
    array_item_key, NodeData, NodeDraft, NodeRef, Scalar, TreeKind, ValueType, INHERITS_KEY,
};
use crate::domain::error::{CompileError, CompileResult};
use crate::domain::variable::VariableSyntax;

/// Variable name that expands to the environment being compiled when no
/// property of that name is in scope.
pub const ENVIRONMENT_VARIABLE: &str = "env";

/// Alias-free output value.
#[derive(Debug, Clone, PartialEq)]
enum Doc {
    Scalar(Option<Scalar>),
    Object(Vec<(String, Doc)>),
    Array(Vec<Doc>),
}

impl Doc {
    fn into_draft(self, key: String) -> NodeDraft {
        match self {
            Doc::Scalar(Some(value)) => NodeDraft::scalar(key, value),
            Doc::Scalar(None) => NodeDraft::new(NodeData::new(key, ValueType::String)),
            Doc::Object(entries) => entries
                .into_iter()
                .fold(NodeDraft::object(key), |draft, (k, v)| {
                    draft.with_child(v.into_draft(k))
                }),
            Doc::Array(items) => items
                .into_iter()
                .fold(NodeDraft::array(key), |draft, item| {
                    draft.with_item(item.into_draft(String::new()))
                }),
        }
    }
}

/// Layered value: scalars remember every layer that set them.
///
/// Anchor and alias markers are carried through the merge and only expanded
/// once every layer is applied, so an alias sees its anchor's final value.
#[derive(Debug, Clone)]
struct Merged {
    anchors: Vec<String>,
    aliases: Vec<String>,
    body: Body,
}

#[derive(Debug, Clone)]
enum Body {
    Scalar(Vec<Option<Scalar>>),
    Object(Vec<(String, Merged)>),
    Array(Vec<Merged>),
}

impl Merged {
    fn plain(body: Body) -> Self {
        Self {
            anchors: Vec::new(),
            aliases: Vec::new(),
            body,
        }
    }

    /// Single-layer view of the subtree at `idx`.
    fn from_tree(tree: &TreeArena, idx: Index) -> Self {
        let Some(data) = tree.data(idx) else {
            return Merged::plain(Body::Scalar(vec![None]));
        };
        let body = match data.value_type {
            ValueType::String | ValueType::Boolean | ValueType::Number => {
                Body::Scalar(vec![data.value.clone()])
            }
            ValueType::Object => Body::Object(
                tree.children(idx)
                    .iter()
                    .map(|&c| {
                        let key = tree.key(c).unwrap_or_default().to_string();
                        (key, Merged::from_tree(tree, c))
                    })
                    .collect(),
            ),
            ValueType::Array => Body::Array(
                tree.children(idx)
                    .iter()
                    .map(|&c| Merged::from_tree(tree, c))
                    .collect(),
            ),
        };
        Self {
            anchors: data.anchor.iter().cloned().collect(),
            aliases: data.aliases.clone(),
            body,
        }
    }

    fn remove_key(&mut self, key: &str) {
        if let Body::Object(entries) = &mut self.body {
            entries.retain(|(k, _)| k != key);
        }
    }

    /// Overlay `layer`. Arrays and mismatched shapes are replaced outright.
    ///
    /// Anchors accumulate across layers. A scalar set by the layer drops an
    /// inherited alias; an object keeps it unless the layer names its own.
    fn merge(&mut self, layer: Merged) {
        let Merged {
            anchors,
            aliases,
            body,
        } = layer;
        for anchor in anchors {
            if !self.anchors.contains(&anchor) {
                self.anchors.push(anchor);
            }
        }
        match (&mut self.body, body) {
            (Body::Object(entries), Body::Object(overlay)) => {
                for (key, value) in overlay {
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, existing)) => existing.merge(value),
                        None => entries.push((key, value)),
                    }
                }
                if !aliases.is_empty() {
                    self.aliases = aliases;
                }
            }
            (Body::Scalar(history), Body::Scalar(values)) => {
                history.extend(values);
                self.aliases = aliases;
            }
            (slot, other) => {
                *slot = other;
                self.aliases = aliases;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Key(String),
    Item(usize),
}

fn display_path(environment: &str, path: &[Segment]) -> String {
    let mut out = environment.to_string();
    for segment in path {
        match segment {
            Segment::Key(key) => {
                out.push('.');
                out.push_str(key);
            }
            Segment::Item(i) => out.push_str(&array_item_key(*i)),
        }
    }
    out
}

fn lookup<'a>(root: &'a Merged, path: &[Segment]) -> Option<&'a Merged> {
    let mut current = root;
    for segment in path {
        current = match (&current.body, segment) {
            (Body::Object(entries), Segment::Key(key)) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)?
            }
            (Body::Array(items), Segment::Item(i)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve the `inherits` chain of `environment`.
///
/// Returns environment roots ordered from the root-most ancestor to the
/// target itself.
fn inheritance_chain(config: &Configuration, environment: &str) -> CompileResult<Vec<Index>> {
    let envs = &config.environments;
    let mut current = config
        .environment(environment)
        .ok_or_else(|| CompileError::UnknownEnvironment(environment.to_string()))?;
    let mut current_name = environment.to_string();
    let mut names = vec![current_name.clone()];
    let mut chain = vec![current];

    while let Some(inherits) = envs.child_by_key(current, INHERITS_KEY) {
        let target = match envs.data(inherits).map(|d| d.value.as_ref()) {
            Some(None) => break,
            Some(Some(Scalar::String(s))) if s.trim().is_empty() => break,
            Some(Some(Scalar::String(s))) => s.trim().to_string(),
            _ => return Err(CompileError::InvalidInherits(current_name)),
        };
        if names.contains(&target) {
            names.push(target);
            return Err(CompileError::InheritanceCycle { chain: names });
        }
        let next = config.environment(&target).ok_or_else(|| {
            CompileError::MissingInheritedEnvironment {
                environment: current_name.clone(),
                target: target.clone(),
            }
        })?;
        names.push(target.clone());
        chain.push(next);
        current = next;
        current_name = target;
    }
    debug!("inheritance_chain: {}", names.join(" -> "));
    chain.reverse();
    Ok(chain)
}

/// Where an anchor's content is taken from.
#[derive(Debug, Clone)]
enum AnchorSource {
    /// A node of the merged document.
    Merged(Vec<Segment>),
    /// A node outside the inheritance chain, read from its own tree.
    Node(NodeRef),
}

fn collect_anchors(node: &Merged, path: &mut Vec<Segment>, out: &mut HashMap<String, AnchorSource>) {
    for anchor in &node.anchors {
        out.entry(anchor.clone())
            .or_insert_with(|| AnchorSource::Merged(path.clone()));
    }
    match &node.body {
        Body::Scalar(_) => {}
        Body::Object(entries) => {
            for (key, child) in entries {
                path.push(Segment::Key(key.clone()));
                collect_anchors(child, path, out);
                path.pop();
            }
        }
        Body::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(Segment::Item(i));
                collect_anchors(item, path, out);
                path.pop();
            }
        }
    }
}

/// Expands aliases into the content of their anchors.
struct Materializer<'a> {
    config: &'a Configuration,
    root: &'a Merged,
    environment: &'a str,
    anchors: HashMap<String, AnchorSource>,
    expanding: Vec<String>,
}

impl<'a> Materializer<'a> {
    /// The first declaration of an anchor name wins: merged document order,
    /// then the raw trees, default first.
    fn new(config: &'a Configuration, root: &'a Merged, environment: &'a str) -> Self {
        let mut anchors = HashMap::new();
        collect_anchors(root, &mut Vec::new(), &mut anchors);
        for tree in [&config.default, &config.environments] {
            for (idx, node) in tree.iter() {
                if let Some(anchor) = &node.data.anchor {
                    anchors
                        .entry(anchor.clone())
                        .or_insert_with(|| AnchorSource::Node(NodeRef::new(tree.kind(), idx)));
                }
            }
        }
        Self {
            config,
            root,
            environment,
            anchors,
            expanding: Vec::new(),
        }
    }

    /// Marker-free copy of `node`, found at `path`.
    fn materialize(&mut self, node: &Merged, path: &mut Vec<Segment>) -> CompileResult<Merged> {
        let mut aliased = Vec::with_capacity(node.aliases.len());
        for alias in &node.aliases {
            aliased.push(self.expand_alias(alias, path)?);
        }

        let body = match &node.body {
            Body::Scalar(history) => match aliased.into_iter().next() {
                Some(expanded) => return Ok(expanded),
                None => Body::Scalar(history.clone()),
            },
            Body::Object(own) => {
                if own.is_empty() && aliased.len() == 1 {
                    if let Some(expanded) = aliased.pop() {
                        return Ok(expanded);
                    }
                }
                // Merge-key semantics: earlier aliases win over later ones,
                // own keys win over all of them.
                let mut entries: Vec<(String, Merged)> = Vec::new();
                for expanded in aliased {
                    if let Body::Object(alias_entries) = expanded.body {
                        for (key, value) in alias_entries {
                            if !entries.iter().any(|(k, _)| *k == key) {
                                entries.push((key, value));
                            }
                        }
                    }
                }
                for (key, child) in own {
                    path.push(Segment::Key(key.clone()));
                    let value = self.materialize(child, path);
                    path.pop();
                    let value = value?;
                    match entries.iter_mut().find(|(k, _)| k == key) {
                        Some((_, existing)) => *existing = value,
                        None => entries.push((key.clone(), value)),
                    }
                }
                Body::Object(entries)
            }
            Body::Array(items) => {
                if items.is_empty() {
                    if let Some(expanded) = aliased.into_iter().next() {
                        return Ok(expanded);
                    }
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push(Segment::Item(i));
                    let value = self.materialize(item, path);
                    path.pop();
                    out.push(value?);
                }
                Body::Array(out)
            }
        };
        Ok(Merged::plain(body))
    }

    fn expand_alias(&mut self, alias: &str, path: &mut Vec<Segment>) -> CompileResult<Merged> {
        let root = self.root;
        let config = self.config;
        let source = match self.anchors.get(alias) {
            Some(AnchorSource::Merged(at)) => lookup(root, at).cloned(),
            Some(AnchorSource::Node(node)) => config
                .tree(node.tree)
                .map(|tree| Merged::from_tree(tree, node.index)),
            None => None,
        };
        let Some(source) = source else {
            return Err(CompileError::UnresolvedAlias {
                alias: alias.to_string(),
                path: display_path(self.environment, path),
            });
        };
        if self.expanding.iter().any(|a| a == alias) {
            return Err(CompileError::AliasCycle {
                alias: alias.to_string(),
                path: display_path(self.environment, path),
            });
        }
        self.expanding.push(alias.to_string());
        let expanded = self.materialize(&source, path);
        self.expanding.pop();
        expanded
    }
}

type LayerKey = (Vec<Segment>, usize);

/// Substitutes variable references in the merged document.
///
/// A name resolves against the nearest enclosing object that has a scalar
/// property of that name, searching outward to the document root.
struct Resolver<'a> {
    root: &'a Merged,
    syntax: &'a VariableSyntax,
    environment: &'a str,
    visiting: HashSet<LayerKey>,
    cache: HashMap<LayerKey, Option<Scalar>>,
}

impl<'a> Resolver<'a> {
    fn new(root: &'a Merged, syntax: &'a VariableSyntax, environment: &'a str) -> Self {
        Self {
            root,
            syntax,
            environment,
            visiting: HashSet::new(),
            cache: HashMap::new(),
        }
    }

    fn resolve_tree(&mut self, node: &Merged, path: &mut Vec<Segment>) -> CompileResult<Doc> {
        match &node.body {
            Body::Scalar(history) => {
                let layer = history.len().saturating_sub(1);
                Ok(Doc::Scalar(self.resolve_scalar(path, layer)?))
            }
            Body::Object(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, child) in entries {
                    path.push(Segment::Key(key.clone()));
                    let doc = self.resolve_tree(child, path);
                    path.pop();
                    out.push((key.clone(), doc?));
                }
                Ok(Doc::Object(out))
            }
            Body::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push(Segment::Item(i));
                    let doc = self.resolve_tree(item, path);
                    path.pop();
                    out.push(doc?);
                }
                Ok(Doc::Array(out))
            }
        }
    }

    fn resolve_scalar(&mut self, path: &[Segment], layer: usize) -> CompileResult<Option<Scalar>> {
        let key: LayerKey = (path.to_vec(), layer);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }
        let value = match lookup(self.root, path).map(|m| &m.body) {
            Some(Body::Scalar(history)) => history.get(layer).cloned().flatten(),
            _ => None,
        };
        let syntax = self.syntax;
        let resolved = match value {
            Some(Scalar::String(text)) if syntax.has_references(&text) => {
                self.visiting.insert(key.clone());
                let result = syntax.substitute(&text, |name| self.lookup_variable(name, path, layer));
                self.visiting.remove(&key);
                Some(Scalar::String(result?))
            }
            other => other,
        };
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn lookup_variable(&mut self, name: &str, path: &[Segment], layer: usize) -> CompileResult<String> {
        for depth in (0..path.len()).rev() {
            let scope = &path[..depth];
            let Some(Body::Object(entries)) = lookup(self.root, scope).map(|m| &m.body) else {
                continue;
            };
            let Some((_, target)) = entries.iter().find(|(k, _)| k == name) else {
                continue;
            };
            let Body::Scalar(history) = &target.body else {
                return Err(CompileError::NonScalarVariable {
                    name: name.to_string(),
                    path: display_path(self.environment, path),
                });
            };
            let mut target_path = scope.to_vec();
            target_path.push(Segment::Key(name.to_string()));

            // A value referring to its own key sees the layer below.
            let target_layer = if target_path == path {
                if layer == 0 {
                    return Err(CompileError::UnresolvedVariable {
                        name: name.to_string(),
                        path: display_path(self.environment, path),
                    });
                }
                layer - 1
            } else {
                history.len().saturating_sub(1)
            };

            if self.visiting.contains(&(target_path.clone(), target_layer)) {
                return Err(CompileError::VariableCycle {
                    name: name.to_string(),
                    path: display_path(self.environment, path),
                });
            }
            let value = self.resolve_scalar(&target_path, target_layer)?;
            return Ok(value.map(|v| v.to_string()).unwrap_or_default());
        }
        if name == ENVIRONMENT_VARIABLE {
            return Ok(self.environment.to_string());
        }
        Err(CompileError::UnresolvedVariable {
            name: name.to_string(),
            path: display_path(self.environment, path),
        })
    }
}

/// Compile `environment` into a detached tree of plain values.
#[instrument(level = "debug", skip(config, syntax))]
pub(crate) fn compile_tree(
    environment: &str,
    config: &Configuration,
    syntax: &VariableSyntax,
) -> CompileResult<TreeArena> {
    let chain = inheritance_chain(config, environment)?;

    let mut merged = Merged::from_tree(&config.default, config.default.root());
    for env in chain {
        let mut layer = Merged::from_tree(&config.environments, env);
        layer.remove_key(INHERITS_KEY);
        merged.merge(layer);
    }

    let mut materializer = Materializer::new(config, &merged, environment);
    let plain = materializer.materialize(&merged, &mut Vec::new())?;

    let mut resolver = Resolver::new(&plain, syntax, environment);
    let resolved = resolver.resolve_tree(&plain, &mut Vec::new())?;

    let mut tree = TreeArena::new(TreeKind::Detached);
    let root = tree.root();
    if let Doc::Object(entries) = resolved {
        for (key, value) in entries {
            tree.graft(root, value.into_draft(key));
        }
    }
    debug!("compile_tree: {} nodes", tree.len());
    Ok(tree)
}
