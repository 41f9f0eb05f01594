//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent violations of the tree-pair invariants.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("duplicate key '{key}' under {parent}")]
    DuplicateKey { key: String, parent: String },

    #[error("cannot add children to scalar node: {0}")]
    NotAContainer(String),

    #[error("cannot delete tree root: {0}")]
    CannotDeleteRoot(String),

    #[error("value {value:?} does not match type {value_type}")]
    TypeMismatch { value: String, value_type: String },

    #[error("unknown value type: {0}")]
    UnknownValueType(String),

    #[error("invalid variable syntax: {0}")]
    InvalidVariableSyntax(String),

    #[error("no property is being composed")]
    NotComposing,
}

/// Errors raised by the YAML compiler.
///
/// Compilation is read-only over the trees, so none of these leave the
/// configuration in a modified state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("environment not found: {0}")]
    UnknownEnvironment(String),

    #[error("cyclic inheritance detected: {}", chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },

    #[error("environment '{environment}' inherits from unknown environment '{target}'")]
    MissingInheritedEnvironment { environment: String, target: String },

    #[error("environment '{0}' has an invalid 'inherits' value (expected an environment name)")]
    InvalidInherits(String),

    #[error("alias '*{alias}' at {path} references an undefined anchor")]
    UnresolvedAlias { alias: String, path: String },

    #[error("alias '*{alias}' at {path} refers back to itself")]
    AliasCycle { alias: String, path: String },

    #[error("variable '{name}' at {path} cannot be resolved")]
    UnresolvedVariable { name: String, path: String },

    #[error("cyclic variable reference '{name}' at {path}")]
    VariableCycle { name: String, path: String },

    #[error("variable '{name}' at {path} references a non-scalar property")]
    NonScalarVariable { name: String, path: String },

    #[error("{path} cannot be written as YAML: {reason}")]
    UnrepresentableNode { path: String, reason: String },

    #[error("invalid YAML: {0}")]
    InvalidYaml(String),
}

/// Result type for tree operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;
