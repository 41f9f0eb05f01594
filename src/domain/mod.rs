//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod alignment;
pub mod arena;
pub mod configuration;
pub mod display;
pub mod entities;
pub mod error;
pub mod keys;
pub mod variable;
pub mod yaml;

pub use arena::{TreeArena, TreeNode};
pub use configuration::{split_path, Configuration};
pub use display::TreeDisplay;
pub use entities::*;
pub use error::{CompileError, CompileResult, DomainError, DomainResult};
pub use keys::key_options;
pub use variable::{escape_regexp, VariableSyntax};
pub use yaml::YamlCompiler;
