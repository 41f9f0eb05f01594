//! YAML compiler: serialization, parsing and per-environment compilation.

mod compile;
mod emit;
mod load;

pub use compile::ENVIRONMENT_VARIABLE;

use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::configuration::Configuration;
use crate::domain::entities::{DEFAULT_ROOT_KEY, ENVIRONMENTS_ROOT_KEY};
use crate::domain::error::CompileResult;
use crate::domain::variable::{escape_regexp, VariableSyntax};

use emit::Emitter;

/// Stateless YAML compiler parameterised by the variable syntax.
#[derive(Debug, Clone, Default)]
pub struct YamlCompiler {
    syntax: VariableSyntax,
}

impl YamlCompiler {
    pub fn new(syntax: VariableSyntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> &VariableSyntax {
        &self.syntax
    }

    pub fn construct_variable(&self, name: &str) -> String {
        self.syntax.construct_variable(name)
    }

    pub fn escape_regexp(&self, pattern: &str) -> String {
        escape_regexp(pattern)
    }

    /// Serialize the children of `tree`'s root.
    ///
    /// With `validate`, an alias to an anchor that is not declared earlier
    /// in the same document is an error. Previews of partial trees pass
    /// `false`.
    pub fn convert_tree_to_yaml(&self, tree: &TreeArena, validate: bool) -> CompileResult<String> {
        Emitter::new(validate).document(tree)
    }

    /// Serialize the tree pair as a `default:` / `environments:` document.
    ///
    /// Always validates: environments may alias anchors of the default tree,
    /// which precedes them.
    pub fn convert_configuration_to_yaml(&self, config: &Configuration) -> CompileResult<String> {
        Emitter::new(true).named_document(&[
            (DEFAULT_ROOT_KEY, &config.default),
            (ENVIRONMENTS_ROOT_KEY, &config.environments),
        ])
    }

    /// Compile `environment` into plain YAML.
    ///
    /// The result has no anchors, aliases, `inherits` keys or variable
    /// references left.
    #[instrument(level = "debug", skip(self, config))]
    pub fn compile_yaml(&self, environment: &str, config: &Configuration) -> CompileResult<String> {
        let tree = self.compile_tree(environment, config)?;
        let yaml = Emitter::new(false).document(&tree)?;
        debug!("compile_yaml: {} bytes", yaml.len());
        Ok(yaml)
    }

    /// Compile `environment` into a detached tree of plain values.
    pub fn compile_tree(&self, environment: &str, config: &Configuration) -> CompileResult<TreeArena> {
        compile::compile_tree(environment, config, &self.syntax)
    }

    /// Parse a `default:` / `environments:` document.
    pub fn parse_configuration(&self, text: &str) -> CompileResult<Configuration> {
        load::parse_configuration(text)
    }
}
