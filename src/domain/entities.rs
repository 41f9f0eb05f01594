//! Domain entities: core data structures

use std::fmt;
use std::str::FromStr;

use generational_arena::Index;
use serde_yaml::Number;

use crate::domain::error::{DomainError, DomainResult};

/// Reserved key naming the environment an environment inherits from.
pub const INHERITS_KEY: &str = "inherits";

/// Key of the default tree root.
pub const DEFAULT_ROOT_KEY: &str = "default";

/// Key of the environments tree root.
pub const ENVIRONMENTS_ROOT_KEY: &str = "environments";

/// Path segment standing for "first element" of an array.
///
/// Array shape may differ across environments, so alignment never uses
/// literal positions beyond the first item.
pub const ARRAY_ITEM_PLACEHOLDER: &str = "[0]";

/// Key of the array element at `position`.
pub fn array_item_key(position: usize) -> String {
    format!("[{}]", position)
}

/// Value type of a node; selects leaf vs. container semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Boolean,
    Number,
    Object,
    Array,
}

impl ValueType {
    pub fn is_scalar(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Boolean | ValueType::Number)
    }

    pub fn is_container(&self) -> bool {
        !self.is_scalar()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::Object => "object",
            ValueType::Array => "array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ValueType::String),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "number" | "int" | "float" => Ok(ValueType::Number),
            "object" | "map" => Ok(ValueType::Object),
            "array" | "list" | "seq" => Ok(ValueType::Array),
            other => Err(DomainError::UnknownValueType(other.to_string())),
        }
    }
}

/// Scalar payload of a leaf node.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Number(Number),
}

impl Scalar {
    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::String(_) => ValueType::String,
            Scalar::Boolean(_) => ValueType::Boolean,
            Scalar::Number(_) => ValueType::Number,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parse user input as a scalar of the given type.
    pub fn parse(value_type: ValueType, text: &str) -> DomainResult<Self> {
        let mismatch = || DomainError::TypeMismatch {
            value: text.to_string(),
            value_type: value_type.to_string(),
        };
        match value_type {
            ValueType::String => Ok(Scalar::String(text.to_string())),
            ValueType::Boolean => match text.trim() {
                "true" => Ok(Scalar::Boolean(true)),
                "false" => Ok(Scalar::Boolean(false)),
                _ => Err(mismatch()),
            },
            ValueType::Number => {
                let trimmed = text.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(Scalar::Number(Number::from(i)))
                } else if let Ok(u) = trimmed.parse::<u64>() {
                    Ok(Scalar::Number(Number::from(u)))
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Ok(Scalar::Number(Number::from(f)))
                } else {
                    Err(mismatch())
                }
            }
            ValueType::Object | ValueType::Array => Err(mismatch()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Editable fields of a configuration node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    /// Property name, unique among siblings
    pub key: String,
    pub value_type: ValueType,
    /// Present only for scalar value types
    pub value: Option<Scalar>,
    /// Anchor name this node exports
    pub anchor: Option<String>,
    /// Anchor names this node aliases, in merge order
    pub aliases: Vec<String>,
    /// Free text, not interpreted
    pub comment: Option<String>,
}

impl NodeData {
    pub fn new(key: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            key: key.into(),
            value_type,
            value: None,
            anchor: None,
            aliases: Vec::new(),
            comment: None,
        }
    }

    pub fn scalar(key: impl Into<String>, value: Scalar) -> Self {
        let mut data = Self::new(key, value.value_type());
        data.value = Some(value);
        data
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.aliases.iter().any(|a| a == name)
    }
}

impl fmt::Display for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(value) = &self.value {
            write!(f, ": {}", value)?;
        }
        write!(f, " ({})", self.value_type)?;
        if let Some(anchor) = &self.anchor {
            write!(f, " &{}", anchor)?;
        }
        for alias in &self.aliases {
            write!(f, " *{}", alias)?;
        }
        Ok(())
    }
}

/// Detached node with owned children.
///
/// Used as the candidate of an add/edit flow before it is grafted into a
/// tree, and as the output of subtree extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub data: NodeData,
    pub children: Vec<NodeDraft>,
}

impl NodeDraft {
    pub fn new(data: NodeData) -> Self {
        Self {
            data,
            children: Vec::new(),
        }
    }

    pub fn scalar(key: impl Into<String>, value: Scalar) -> Self {
        Self::new(NodeData::scalar(key, value))
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::scalar(key, Scalar::String(value.into()))
    }

    pub fn number(key: impl Into<String>, value: i64) -> Self {
        Self::scalar(key, Scalar::Number(Number::from(value)))
    }

    pub fn boolean(key: impl Into<String>, value: bool) -> Self {
        Self::scalar(key, Scalar::Boolean(value))
    }

    pub fn object(key: impl Into<String>) -> Self {
        Self::new(NodeData::new(key, ValueType::Object))
    }

    pub fn array(key: impl Into<String>) -> Self {
        Self::new(NodeData::new(key, ValueType::Array))
    }

    pub fn with_child(mut self, child: NodeDraft) -> Self {
        self.children.push(child);
        self
    }

    /// Append an array element, keyed by its position.
    pub fn with_item(mut self, mut item: NodeDraft) -> Self {
        item.data.key = array_item_key(self.children.len());
        self.children.push(item);
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.data.anchor = Some(anchor.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.data.aliases.push(alias.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.data.comment = Some(comment.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.data.key
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Which of the two roots a node lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeKind {
    Default,
    Environments,
    /// Anonymous tree used for previews and compiled output
    Detached,
}

/// Stable handle to a node in the tree pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub tree: TreeKind,
    pub index: Index,
}

impl NodeRef {
    pub fn new(tree: TreeKind, index: Index) -> Self {
        Self { tree, index }
    }
}

/// A key a user may pick when adding or editing a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOption {
    pub key: String,
    pub value_type: ValueType,
}

impl KeyOption {
    pub fn new(key: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            key: key.into(),
            value_type,
        }
    }
}
