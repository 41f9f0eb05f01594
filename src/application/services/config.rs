//! Configuration file service
//!
//! Loads and saves tree pairs, and runs the compiler on their behalf.
//! Compiler errors never escape as-is: each one is reported to the alert
//! sink and the caller gets a plain failure value.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::{CompileError, Configuration, NodeRef, YamlCompiler};
use crate::infrastructure::traits::{Alert, AlertSink, FileSystem};

/// File extensions recognised as configuration files.
pub const CONFIG_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Service for loading, validating and compiling configuration files.
pub struct ConfigService {
    fs: Arc<dyn FileSystem>,
    compiler: YamlCompiler,
    alerts: Arc<dyn AlertSink>,
}

impl ConfigService {
    pub fn new(fs: Arc<dyn FileSystem>, compiler: YamlCompiler, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            fs,
            compiler,
            alerts,
        }
    }

    pub fn compiler(&self) -> &YamlCompiler {
        &self.compiler
    }

    /// Read and parse a configuration file.
    pub fn load(&self, path: &Path) -> ApplicationResult<Configuration> {
        debug!("load: {}", path.display());
        let text = self
            .fs
            .read_to_string(path)
            .with_path_context("read configuration", path)?;
        let config = self.compiler.parse_configuration(&text)?;
        Ok(config)
    }

    /// Serialize and atomically write `config` to `path`.
    ///
    /// Nothing is written when serialization fails.
    pub fn save(&self, path: &Path, config: &Configuration) -> ApplicationResult<()> {
        let yaml = match self.compiler.convert_configuration_to_yaml(config) {
            Ok(yaml) => yaml,
            Err(e) => {
                self.report(&format!("Saving {} failed:\n", path.display()), &e);
                return Err(e.into());
            }
        };
        self.fs
            .write(path, &yaml)
            .with_path_context("write configuration", path)?;
        info!("saved {}", path.display());
        Ok(())
    }

    /// Serialize the whole configuration and compile every environment.
    pub fn validate(&self, config: &Configuration) -> bool {
        let result = self
            .compiler
            .convert_configuration_to_yaml(config)
            .and_then(|_| {
                config
                    .environment_names()
                    .iter()
                    .try_for_each(|env| self.compiler.compile_yaml(env, config).map(|_| ()))
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                self.report("YAML validation failed:\n", &e);
                false
            }
        }
    }

    /// Compiled YAML of `environment`, or None after alerting.
    pub fn compile(&self, environment: &str, config: &Configuration) -> Option<String> {
        match self.compiler.compile_yaml(environment, config) {
            Ok(yaml) => Some(yaml),
            Err(e) => {
                self.report("", &e);
                None
            }
        }
    }

    /// YAML of the single node `node`, without alias validation since the
    /// anchors it uses may live outside the subtree.
    pub fn preview(&self, config: &Configuration, node: NodeRef) -> Option<String> {
        let tree = config.tree(node.tree)?.detach_preview(node.index)?;
        match self.compiler.convert_tree_to_yaml(&tree, false) {
            Ok(yaml) => Some(yaml),
            Err(e) => {
                self.report("", &e);
                None
            }
        }
    }

    /// Configuration files below `dir` that parse successfully.
    pub fn discover(&self, dir: &Path) -> ApplicationResult<Vec<PathBuf>> {
        let candidates = self
            .fs
            .list_files(dir, &CONFIG_EXTENSIONS)
            .with_path_context("scan directory", dir)?;
        let mut found = Vec::new();
        for path in candidates {
            match self.load(&path) {
                Ok(_) => found.push(path),
                Err(e) => {
                    debug!("discover: skipping {}: {}", path.display(), e);
                    self.alerts
                        .alert(Alert::warning(format!("skipping {}: {}", path.display(), e)));
                }
            }
        }
        Ok(found)
    }

    fn report(&self, prefix: &str, error: &CompileError) {
        warn!("{}{}", prefix, error);
        self.alerts.alert(Alert::error(format!("{}{}", prefix, error)));
    }
}
