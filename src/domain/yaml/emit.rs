//! Block-style YAML emission with anchors, aliases, merge keys and comments.

use std::collections::HashSet;

use generational_arena::Index;
use serde_yaml::Value;
use tracing::warn;

use crate::domain::arena::TreeArena;
use crate::domain::entities::{Scalar, ValueType};
use crate::domain::error::{CompileError, CompileResult};

const INDENT: &str = "  ";

/// Rendering of a node's value, placed after `key:` or `- `.
enum Repr {
    Inline(String),
    Block { header: String, lines: Vec<String> },
}

/// Emits trees as YAML, tracking anchors in document order.
///
/// With `validate` set, an alias to an anchor that has not been declared
/// earlier in the document is an error.
pub(crate) struct Emitter {
    validate: bool,
    declared: HashSet<String>,
}

impl Emitter {
    pub(crate) fn new(validate: bool) -> Self {
        Self {
            validate,
            declared: HashSet::new(),
        }
    }

    /// Emit the children of the tree root as a YAML document.
    pub(crate) fn document(&mut self, tree: &TreeArena) -> CompileResult<String> {
        let root = tree.root();
        if tree.is_leaf(root) {
            return Ok("{}\n".to_string());
        }
        let lines = self.mapping_lines(tree, root)?;
        Ok(join_lines(lines))
    }

    /// Emit several trees as named top-level entries of one document.
    pub(crate) fn named_document(&mut self, trees: &[(&str, &TreeArena)]) -> CompileResult<String> {
        let mut lines = Vec::new();
        for (key, tree) in trees {
            let repr = self.value_repr(tree, tree.root())?;
            push_entry(&mut lines, &quote_key(key), repr);
        }
        Ok(join_lines(lines))
    }

    fn mapping_lines(&mut self, tree: &TreeArena, idx: Index) -> CompileResult<Vec<String>> {
        let mut lines = Vec::new();
        for &child in tree.children(idx) {
            let Some(data) = tree.data(child) else {
                continue;
            };
            push_comment(&mut lines, data.comment.as_deref());
            let key = quote_key(&data.key);
            let repr = self.value_repr(tree, child)?;
            push_entry(&mut lines, &key, repr);
        }
        Ok(lines)
    }

    fn sequence_lines(&mut self, tree: &TreeArena, idx: Index) -> CompileResult<Vec<String>> {
        let mut lines = Vec::new();
        for &child in tree.children(idx) {
            let Some(data) = tree.data(child) else {
                continue;
            };
            push_comment(&mut lines, data.comment.as_deref());
            match self.value_repr(tree, child)? {
                Repr::Inline(text) => lines.push(format!("- {}", text)),
                Repr::Block { header, lines: body }
                    if header.is_empty() && body.first().is_some_and(|l| l.starts_with('#')) =>
                {
                    // a comment cannot share the dash line
                    lines.push("-".to_string());
                    lines.extend(body.into_iter().map(|l| format!("{}{}", INDENT, l)));
                }
                Repr::Block { header, lines: body } if header.is_empty() => {
                    for (i, line) in body.into_iter().enumerate() {
                        if i == 0 {
                            lines.push(format!("- {}", line));
                        } else {
                            lines.push(format!("{}{}", INDENT, line));
                        }
                    }
                }
                Repr::Block { header, lines: body } => {
                    lines.push(format!("- {}", header));
                    lines.extend(body.into_iter().map(|l| format!("{}{}", INDENT, l)));
                }
            }
        }
        Ok(lines)
    }

    fn value_repr(&mut self, tree: &TreeArena, idx: Index) -> CompileResult<Repr> {
        let Some(data) = tree.data(idx) else {
            return Ok(Repr::Inline("null".to_string()));
        };
        if let Some(anchor) = &data.anchor {
            self.declared.insert(anchor.clone());
        }
        if self.validate {
            if let Some(alias) = data.aliases.iter().find(|a| !self.declared.contains(*a)) {
                return Err(CompileError::UnresolvedAlias {
                    alias: alias.clone(),
                    path: tree.path_string(idx),
                });
            }
        }

        let anchor_tag = data
            .anchor
            .as_ref()
            .map(|a| format!("&{}", a))
            .unwrap_or_default();
        let with_anchor = |text: &str| {
            if anchor_tag.is_empty() {
                text.to_string()
            } else {
                format!("{} {}", anchor_tag, text)
            }
        };

        let repr = match data.value_type {
            ValueType::String | ValueType::Boolean | ValueType::Number => {
                if let Some(alias) = data.aliases.first() {
                    if data.anchor.is_some() {
                        self.unrepresentable(
                            tree,
                            idx,
                            "an aliased scalar cannot also carry an anchor",
                        )?;
                    }
                    Repr::Inline(format!("*{}", alias))
                } else {
                    Repr::Inline(with_anchor(&scalar_text(data.value.as_ref())))
                }
            }
            ValueType::Object => {
                let leaf = tree.is_leaf(idx);
                if leaf && data.aliases.is_empty() {
                    Repr::Inline(with_anchor("{}"))
                } else if leaf && data.aliases.len() == 1 && data.anchor.is_none() {
                    Repr::Inline(format!("*{}", data.aliases[0]))
                } else {
                    let mut lines = Vec::new();
                    if !data.aliases.is_empty() {
                        lines.push(merge_line(&data.aliases));
                    }
                    lines.extend(self.mapping_lines(tree, idx)?);
                    Repr::Block {
                        header: anchor_tag.clone(),
                        lines,
                    }
                }
            }
            ValueType::Array => {
                if tree.is_leaf(idx) {
                    match data.aliases.first() {
                        Some(alias) if data.anchor.is_none() => Repr::Inline(format!("*{}", alias)),
                        Some(_) => {
                            self.unrepresentable(
                                tree,
                                idx,
                                "an aliased array cannot also carry an anchor",
                            )?;
                            Repr::Inline(with_anchor("[]"))
                        }
                        None => Repr::Inline(with_anchor("[]")),
                    }
                } else {
                    if !data.aliases.is_empty() {
                        self.unrepresentable(
                            tree,
                            idx,
                            "a non-empty array cannot merge aliases",
                        )?;
                    }
                    Repr::Block {
                        header: anchor_tag.clone(),
                        lines: self.sequence_lines(tree, idx)?,
                    }
                }
            }
        };
        Ok(repr)
    }

    /// Markers YAML has no syntax for: an error when validating, dropped
    /// with a warning otherwise.
    fn unrepresentable(&self, tree: &TreeArena, idx: Index, reason: &str) -> CompileResult<()> {
        let path = tree.path_string(idx);
        if self.validate {
            return Err(CompileError::UnrepresentableNode {
                path,
                reason: reason.to_string(),
            });
        }
        warn!("{}: {}, dropping it", path, reason);
        Ok(())
    }
}

fn push_entry(lines: &mut Vec<String>, key: &str, repr: Repr) {
    match repr {
        Repr::Inline(text) => lines.push(format!("{}: {}", key, text)),
        Repr::Block { header, lines: body } => {
            if header.is_empty() {
                lines.push(format!("{}:", key));
            } else {
                lines.push(format!("{}: {}", key, header));
            }
            lines.extend(body.into_iter().map(|l| format!("{}{}", INDENT, l)));
        }
    }
}

fn push_comment(lines: &mut Vec<String>, comment: Option<&str>) {
    if let Some(comment) = comment {
        for line in comment.lines() {
            lines.push(format!("# {}", line).trim_end().to_string());
        }
    }
}

fn merge_line(aliases: &[String]) -> String {
    if aliases.len() == 1 {
        format!("<<: *{}", aliases[0])
    } else {
        let refs: Vec<String> = aliases.iter().map(|a| format!("*{}", a)).collect();
        format!("<<: [{}]", refs.join(", "))
    }
}

fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub(crate) fn scalar_text(value: Option<&Scalar>) -> String {
    match value {
        None => "null".to_string(),
        Some(Scalar::String(s)) => quote_string(s),
        Some(Scalar::Boolean(b)) => b.to_string(),
        Some(Scalar::Number(n)) => n.to_string(),
    }
}

fn quote_key(key: &str) -> String {
    quote_string(key)
}

/// Quote a string only as much as YAML requires.
fn quote_string(s: &str) -> String {
    if let Ok(text) = serde_yaml::to_string(&Value::String(s.to_string())) {
        let text = text.trim_end_matches('\n');
        if !text.contains('\n') {
            return text.to_string();
        }
    }
    double_quoted(s)
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
