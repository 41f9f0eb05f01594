//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/yamlenv/yamlenv.toml`
//! 3. Local config: `<project_dir>/.yamlenv.toml`
//! 4. Environment variables: `YAMLENV_*` prefix

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::variable::{DEFAULT_VARIABLE_PREFIX, DEFAULT_VARIABLE_SUFFIX};
use crate::domain::{DomainResult, VariableSyntax};

/// Variable-reference syntax: `<prefix>name<suffix>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VariablesConfig {
    pub prefix: String,
    pub suffix: String,
}

impl Default for VariablesConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_VARIABLE_PREFIX.to_string(),
            suffix: DEFAULT_VARIABLE_SUFFIX.to_string(),
        }
    }
}

/// Raw variables config for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawVariablesConfig {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

/// Raw settings for intermediate parsing (arrays are Option to detect "not specified").
///
/// Used during layered config merging to distinguish between:
/// - `None` → field not specified, inherit from base
/// - `Some([])` → explicit empty array
/// - `Some([...])` → explicit values to merge
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub default_file: Option<PathBuf>,
    pub environments: Option<Vec<String>>,
    #[serde(default)]
    pub variables: RawVariablesConfig,
}

/// Unified configuration for yamlenv.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Configuration file used when a command gets no file argument
    pub default_file: PathBuf,
    /// Known environment names offered when adding an environment
    pub environments: Vec<String>,
    /// Variable-reference syntax
    pub variables: VariablesConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_file: PathBuf::from("config.yaml"),
            environments: vec!["dev".into(), "qa".into(), "prod".into()],
            variables: VariablesConfig::default(),
        }
    }
}

/// Get the XDG config directory for yamlenv.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "yamlenv").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("yamlenv.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".yamlenv.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl Settings {
    /// Variable syntax described by `variables`.
    pub fn variable_syntax(&self) -> DomainResult<VariableSyntax> {
        VariableSyntax::new(&self.variables.prefix, &self.variables.suffix)
    }

    /// Merge arrays with union semantics and negation support.
    ///
    /// - Items from overlay are appended to base
    /// - Items prefixed with `!` remove the corresponding item from the result
    /// - Duplicates are de-duplicated, first occurrence keeps its position
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
    /// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let negated: HashSet<&str> = overlay
            .iter()
            .filter_map(|item| item.strip_prefix('!'))
            .collect();
        let mut seen = HashSet::new();
        base.iter()
            .chain(overlay.iter().filter(|item| !item.starts_with('!')))
            .filter(|item| !negated.contains(item.as_str()))
            .filter(|item| seen.insert(item.as_str()))
            .cloned()
            .collect()
    }

    /// Expand shell variables and tilde in path-like fields.
    ///
    /// Handles `~`, `$VAR`, and `${VAR}` syntax.
    fn expand_paths(&mut self) {
        let expanded = expand(self.default_file.to_string_lossy().as_ref());
        self.default_file = PathBuf::from(expanded);
    }

    /// Merge overlay config onto self (base) with union semantics for arrays.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            default_file: overlay
                .default_file
                .clone()
                .unwrap_or_else(|| self.default_file.clone()),
            environments: overlay
                .environments
                .as_ref()
                .map(|o| Self::merge_array(&self.environments, o))
                .unwrap_or_else(|| self.environments.clone()),
            variables: self.variables.apply(&overlay.variables),
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for arrays.
    ///
    /// Defaults are just examples; the global config defines the real
    /// baseline for the user.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            default_file: global
                .default_file
                .clone()
                .unwrap_or_else(|| self.default_file.clone()),
            environments: global
                .environments
                .clone()
                .unwrap_or_else(|| self.environments.clone()),
            variables: self.variables.apply(&global.variables),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional project directory for local config
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE (global defines the real baseline)
    /// - Global → Local: UNION with negation support
    /// - Any → Env vars: REPLACE (explicit user override)
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(project) = project_dir {
            let local_path = local_config_path(project);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        current
            .variable_syntax()
            .map_err(|e| ApplicationError::Config {
                message: e.to_string(),
            })?;
        Ok(current)
    }

    /// Apply YAMLENV_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("YAMLENV")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("environments")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("default_file") {
            settings.default_file = PathBuf::from(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("environments") {
            settings.environments = val;
        }
        if let Ok(val) = config.get_string("variables.prefix") {
            settings.variables.prefix = val;
        }
        if let Ok(val) = config.get_string("variables.suffix") {
            settings.variables.suffix = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# yamlenv configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/yamlenv/yamlenv.toml  (defines your baseline)
#   Local:  <project_dir>/.yamlenv.toml     (project-specific additions)
#   Env:    YAMLENV_* environment variables (explicit overrides)
#
# Array Merge Semantics:
#   Global config REPLACES compiled defaults (defaults are just examples).
#   Local config UNIONS with global.
#   Use "!name" in local config to REMOVE an inherited item:
#     environments = ["staging", "!qa"]  # adds staging, removes qa

# Configuration file used when no file argument is given
# default_file = "config.yaml"

# Environment names offered when adding an environment
# environments = ["dev", "qa", "prod"]

[variables]
# Variable-reference syntax: <prefix>name<suffix>
# prefix = "${"
# suffix = "}"
"#
        .to_string()
    }
}

impl VariablesConfig {
    fn apply(&self, overlay: &RawVariablesConfig) -> Self {
        Self {
            prefix: overlay.prefix.clone().unwrap_or_else(|| self.prefix.clone()),
            suffix: overlay.suffix.clone().unwrap_or_else(|| self.suffix.clone()),
        }
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
