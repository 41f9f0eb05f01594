//! Parse a configuration document into the tree pair.
//!
//! Parsing keeps what the tree model stores beside values: `&anchor` names,
//! `*alias` and `<<:` merge references, and `#` comment lines directly above
//! a key or sequence item. Plain scalars are typed the way `serde_yaml` types
//! them, so a saved file reloads with the same value types.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde_yaml::Value;
use tracing::debug;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, Scanner, TScalarStyle, Token, TokenType};

use crate::domain::arena::TreeArena;
use crate::domain::configuration::Configuration;
use crate::domain::entities::{
    NodeData, NodeDraft, Scalar, ValueType, DEFAULT_ROOT_KEY, ENVIRONMENTS_ROOT_KEY,
};
use crate::domain::error::{CompileError, CompileResult};

const MERGE_KEY: &str = "<<";

/// Build a [`Configuration`] from a `default:`/`environments:` document.
pub(crate) fn parse_configuration(text: &str) -> CompileResult<Configuration> {
    let mut builder = Builder::new(text);
    let mut parser = Parser::new(text.chars());
    parser
        .load(&mut builder, false)
        .map_err(|e| CompileError::InvalidYaml(e.to_string()))?;
    if let Some(message) = builder.error.take() {
        return Err(CompileError::InvalidYaml(message));
    }

    let mut converter = Converter::new(text, builder.block_content);
    let mut config = Configuration::new();
    match builder.root {
        None => {}
        Some(Loaded {
            kind: LoadedKind::Scalar { ref text, plain: true },
            ..
        }) if plain_value(text).is_none() => {}
        Some(Loaded {
            kind: LoadedKind::Mapping(entries),
            ..
        }) => {
            for (key, value) in entries {
                let key = key_text(&key)?;
                match key.as_str() {
                    DEFAULT_ROOT_KEY => converter.fill(&mut config.default, &key, value)?,
                    ENVIRONMENTS_ROOT_KEY => {
                        converter.fill(&mut config.environments, &key, value)?;
                        normalize_environments(&mut config.environments)?;
                    }
                    other => {
                        return Err(CompileError::InvalidYaml(format!(
                            "unexpected top-level key '{}', expected '{}' or '{}'",
                            other, DEFAULT_ROOT_KEY, ENVIRONMENTS_ROOT_KEY
                        )))
                    }
                }
            }
        }
        Some(_) => {
            return Err(CompileError::InvalidYaml(
                "configuration document must be a mapping".to_string(),
            ))
        }
    }
    debug!(
        "parse_configuration: {} default nodes, environments {:?}",
        config.default.len(),
        config.environment_names()
    );
    Ok(config)
}

/// Parsed node before conversion, with its source line.
#[derive(Debug)]
struct Loaded {
    kind: LoadedKind,
    anchor: Option<String>,
    line: usize,
}

#[derive(Debug)]
enum LoadedKind {
    Scalar { text: String, plain: bool },
    Alias { name: String, value_type: ValueType },
    Mapping(Vec<(Loaded, Loaded)>),
    Sequence(Vec<Loaded>),
}

struct Frame {
    node: Loaded,
    pending_key: Option<Loaded>,
}

/// Event receiver assembling [`Loaded`] nodes.
///
/// The parser reports anchors by numeric id. Names come from the scanner:
/// the n-th anchor the parser declares is the n-th anchor token in the text.
struct Builder {
    anchor_names: std::vec::IntoIter<String>,
    anchors: HashMap<usize, String>,
    anchor_types: HashMap<String, ValueType>,
    line_starts: Vec<usize>,
    stack: Vec<Frame>,
    root: Option<Loaded>,
    /// Line ranges from a literal or folded scalar's indicator to the next event
    block_content: Vec<Range<usize>>,
    open_block: Option<usize>,
    error: Option<String>,
}

impl Builder {
    fn new(text: &str) -> Self {
        let anchor_names: Vec<String> = Scanner::new(text.chars())
            .filter_map(|Token(_, token)| match token {
                TokenType::Anchor(name) => Some(name),
                _ => None,
            })
            .collect();
        let mut line_starts = vec![0];
        line_starts.extend(
            text.chars()
                .enumerate()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            anchor_names: anchor_names.into_iter(),
            anchors: HashMap::new(),
            anchor_types: HashMap::new(),
            line_starts,
            stack: Vec::new(),
            root: None,
            block_content: Vec::new(),
            open_block: None,
            error: None,
        }
    }

    fn line_of(&self, mark: &Marker) -> usize {
        self.line_starts
            .partition_point(|&start| start <= mark.index())
            .saturating_sub(1)
    }

    fn declare(&mut self, anchor_id: usize, value_type: ValueType) -> Option<String> {
        if anchor_id == 0 {
            return None;
        }
        if let Some(name) = self.anchors.get(&anchor_id) {
            return Some(name.clone());
        }
        let Some(name) = self.anchor_names.next() else {
            self.error = Some(format!("anchor #{} has no name", anchor_id));
            return None;
        };
        self.anchors.insert(anchor_id, name.clone());
        self.anchor_types.insert(name.clone(), value_type);
        Some(name)
    }

    fn insert(&mut self, node: Loaded) {
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
            Some(Frame {
                node:
                    Loaded {
                        kind: LoadedKind::Sequence(items),
                        ..
                    },
                ..
            }) => items.push(node),
            Some(Frame {
                node:
                    Loaded {
                        kind: LoadedKind::Mapping(entries),
                        ..
                    },
                pending_key,
            }) => match pending_key.take() {
                None => *pending_key = Some(node),
                Some(key) => entries.push((key, node)),
            },
            Some(_) => {}
        }
    }
}

impl MarkedEventReceiver for Builder {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let line = self.line_of(&mark);
        if let Some(start) = self.open_block.take() {
            if line > start {
                self.block_content.push(start..line);
            }
        }
        match event {
            Event::Scalar(text, style, anchor_id, ..) => {
                let plain = matches!(style, TScalarStyle::Plain);
                if matches!(style, TScalarStyle::Literal | TScalarStyle::Folded) {
                    self.open_block = Some(line);
                }
                let value_type = scalar_value(&text, plain)
                    .map(|v| v.value_type())
                    .unwrap_or(ValueType::String);
                let anchor = self.declare(anchor_id, value_type);
                self.insert(Loaded {
                    kind: LoadedKind::Scalar { text, plain },
                    anchor,
                    line,
                });
            }
            Event::Alias(anchor_id) => match self.anchors.get(&anchor_id).cloned() {
                Some(name) => {
                    let value_type = self
                        .anchor_types
                        .get(&name)
                        .copied()
                        .unwrap_or(ValueType::Object);
                    self.insert(Loaded {
                        kind: LoadedKind::Alias { name, value_type },
                        anchor: None,
                        line,
                    });
                }
                None => self.error = Some(format!("alias #{} has no anchor", anchor_id)),
            },
            Event::MappingStart(anchor_id, ..) => {
                let anchor = self.declare(anchor_id, ValueType::Object);
                self.stack.push(Frame {
                    node: Loaded {
                        kind: LoadedKind::Mapping(Vec::new()),
                        anchor,
                        line,
                    },
                    pending_key: None,
                });
            }
            Event::SequenceStart(anchor_id, ..) => {
                let anchor = self.declare(anchor_id, ValueType::Array);
                self.stack.push(Frame {
                    node: Loaded {
                        kind: LoadedKind::Sequence(Vec::new()),
                        anchor,
                        line,
                    },
                    pending_key: None,
                });
            }
            Event::MappingEnd | Event::SequenceEnd => {
                if let Some(frame) = self.stack.pop() {
                    self.insert(frame.node);
                }
            }
            _ => {}
        }
    }
}

/// Turns [`Loaded`] nodes into drafts and attaches comment lines.
///
/// Each comment line is claimed by at most one node, the outermost one
/// that starts right below it.
struct Converter<'a> {
    lines: Vec<&'a str>,
    block_content: Vec<Range<usize>>,
    claimed: HashSet<usize>,
}

impl<'a> Converter<'a> {
    fn new(text: &'a str, block_content: Vec<Range<usize>>) -> Self {
        Self {
            lines: text.split('\n').collect(),
            block_content,
            claimed: HashSet::new(),
        }
    }

    fn fill(&mut self, tree: &mut TreeArena, name: &str, value: Loaded) -> CompileResult<()> {
        match value.kind {
            LoadedKind::Scalar { ref text, plain: true } if plain_value(text).is_none() => Ok(()),
            LoadedKind::Mapping(_) => {
                let draft = self.draft(name.to_string(), value)?;
                let root = tree.root();
                for child in draft.children {
                    tree.graft(root, child);
                }
                Ok(())
            }
            _ => Err(CompileError::InvalidYaml(format!(
                "'{}' must be a mapping",
                name
            ))),
        }
    }

    fn draft(&mut self, key: String, node: Loaded) -> CompileResult<NodeDraft> {
        let anchor = node.anchor;
        let mut draft = match node.kind {
            LoadedKind::Scalar { text, plain } => match scalar_value(&text, plain) {
                Some(value) => NodeDraft::scalar(key, value),
                None => NodeDraft::new(NodeData::new(key, ValueType::String)),
            },
            LoadedKind::Alias { name, value_type } => {
                NodeDraft::new(NodeData::new(key, value_type)).with_alias(name)
            }
            LoadedKind::Mapping(entries) => self.mapping(key, entries)?,
            LoadedKind::Sequence(items) => {
                let mut draft = NodeDraft::array(key);
                for item in items {
                    let comment = self.item_comment(item.line);
                    let mut child = self.draft(String::new(), item)?;
                    child.data.comment = comment;
                    draft = draft.with_item(child);
                }
                draft
            }
        };
        draft.data.anchor = anchor;
        Ok(draft)
    }

    fn mapping(&mut self, key: String, entries: Vec<(Loaded, Loaded)>) -> CompileResult<NodeDraft> {
        let mut draft = NodeDraft::object(key);
        let mut inline_merges = Vec::new();
        for (entry_key, value) in entries {
            if is_merge_key(&entry_key) {
                match value.kind {
                    LoadedKind::Alias { name, .. } => draft.data.aliases.push(name),
                    LoadedKind::Sequence(items) => {
                        for item in items {
                            match item.kind {
                                LoadedKind::Alias { name, .. } => draft.data.aliases.push(name),
                                _ => {
                                    return Err(CompileError::InvalidYaml(format!(
                                        "'{}' under '{}' may only list aliases",
                                        MERGE_KEY, draft.data.key
                                    )))
                                }
                            }
                        }
                    }
                    LoadedKind::Mapping(_) => inline_merges.push(value),
                    LoadedKind::Scalar { .. } => {
                        return Err(CompileError::InvalidYaml(format!(
                            "'{}' under '{}' must reference a mapping",
                            MERGE_KEY, draft.data.key
                        )))
                    }
                }
                continue;
            }
            let name = key_text(&entry_key)?;
            if draft.children.iter().any(|c| c.key() == name) {
                return Err(CompileError::InvalidYaml(format!(
                    "duplicate key '{}' under '{}'",
                    name, draft.data.key
                )));
            }
            let comment = self.comment_above(entry_key.line);
            let mut child = self.draft(name, value)?;
            child.data.comment = comment;
            draft.children.push(child);
        }
        // inline `<<: {..}` entries fill in keys the mapping does not set itself
        for inline in inline_merges {
            let merged = self.draft(String::new(), inline)?;
            for child in merged.children {
                if !draft.children.iter().any(|c| c.key() == child.key()) {
                    draft.children.push(child);
                }
            }
        }
        Ok(draft)
    }

    /// Comment of a sequence item. A block mapping item may start on the
    /// line after its `-`; its own comment then sits above the dash.
    fn item_comment(&mut self, line: usize) -> Option<String> {
        if self
            .lines
            .get(line)
            .is_some_and(|l| l.trim_start().starts_with('-'))
        {
            return self.comment_above(line);
        }
        let mut current = line;
        while current > 0 {
            current -= 1;
            let text = self.lines.get(current).map(|l| l.trim_start()).unwrap_or_default();
            if text.starts_with('#') {
                continue;
            }
            if text.starts_with('-') {
                return self.comment_above(current);
            }
            break;
        }
        None
    }

    /// A line inside a literal or folded scalar, indented at least as deep
    /// as the scalar's first line.
    fn is_block_content(&self, line: usize) -> bool {
        let indent = |l: &str| l.len() - l.trim_start().len();
        self.block_content.iter().any(|range| {
            if !range.contains(&line) {
                return false;
            }
            let first = range
                .clone()
                .skip(1)
                .filter_map(|l| self.lines.get(l))
                .find(|l| !l.trim().is_empty())
                .map(|l| indent(*l))
                .unwrap_or_default();
            self.lines.get(line).is_some_and(|l| indent(*l) >= first)
        })
    }

    /// Contiguous `#` lines directly above `line`.
    fn comment_above(&mut self, line: usize) -> Option<String> {
        let mut collected = Vec::new();
        let mut current = line;
        while current > 0 {
            current -= 1;
            if self.claimed.contains(&current) || self.is_block_content(current) {
                break;
            }
            let Some(body) = self
                .lines
                .get(current)
                .and_then(|l| l.trim().strip_prefix('#'))
            else {
                break;
            };
            collected.push((current, body.strip_prefix(' ').unwrap_or(body).to_string()));
        }
        if collected.is_empty() {
            return None;
        }
        collected.reverse();
        self.claimed.extend(collected.iter().map(|(l, _)| *l));
        let text: Vec<String> = collected.into_iter().map(|(_, t)| t).collect();
        Some(text.join("\n"))
    }
}

/// An empty environment (`prod:`) is an empty mapping, anything else
/// scalar is malformed.
fn normalize_environments(envs: &mut TreeArena) -> CompileResult<()> {
    let root = envs.root();
    for env in envs.children(root).to_vec() {
        let Some(data) = envs.data_mut(env) else {
            continue;
        };
        match data.value_type {
            ValueType::Object => {}
            _ if data.value.is_none() && data.aliases.is_empty() => {
                data.value_type = ValueType::Object;
            }
            _ => {
                return Err(CompileError::InvalidYaml(format!(
                    "environment '{}' must be a mapping",
                    data.key
                )))
            }
        }
    }
    Ok(())
}

fn scalar_value(text: &str, plain: bool) -> Option<Scalar> {
    if plain {
        plain_value(text)
    } else {
        Some(Scalar::String(text.to_string()))
    }
}

/// Type a plain scalar; `None` for null.
fn plain_value(text: &str) -> Option<Scalar> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Null) => None,
        Ok(Value::Bool(b)) => Some(Scalar::Boolean(b)),
        Ok(Value::Number(n)) => Some(Scalar::Number(n)),
        _ => Some(Scalar::String(text.to_string())),
    }
}

fn is_merge_key(node: &Loaded) -> bool {
    matches!(&node.kind, LoadedKind::Scalar { text, plain: true } if text == MERGE_KEY)
}

fn key_text(node: &Loaded) -> CompileResult<String> {
    match &node.kind {
        LoadedKind::Scalar { text, .. } => Ok(text.clone()),
        _ => Err(CompileError::InvalidYaml(format!(
            "line {}: only scalar keys are supported",
            node.line + 1
        ))),
    }
}
