//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{ConfigService, EditSession};
use crate::application::ApplicationError;
use crate::config::Settings;
use crate::domain::{Configuration, VariableSyntax, YamlCompiler};
use crate::infrastructure::traits::{
    AlertSink, FileSystem, RealFileSystem, Selector, SkimSelector, TerminalAlertSink,
};
use crate::infrastructure::InfraResult;

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// User-facing alert sink
    pub alerts: Arc<dyn AlertSink>,

    /// Interactive selector
    pub selector: Arc<dyn Selector>,

    syntax: VariableSyntax,
    config_service: ConfigService,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(TerminalAlertSink),
            Arc::new(SkimSelector),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        alerts: Arc<dyn AlertSink>,
        selector: Arc<dyn Selector>,
    ) -> InfraResult<Self> {
        let syntax = settings.variable_syntax().map_err(ApplicationError::from)?;
        let config_service = ConfigService::new(
            Arc::clone(&fs),
            YamlCompiler::new(syntax.clone()),
            Arc::clone(&alerts),
        );
        let settings = Arc::new(settings);

        Ok(Self {
            settings,
            fs,
            alerts,
            selector,
            syntax,
            config_service,
        })
    }

    pub fn config_service(&self) -> &ConfigService {
        &self.config_service
    }

    /// Open an edit session over `config` with the configured environments.
    pub fn edit_session(&self, config: Configuration) -> EditSession {
        EditSession::new(
            config,
            self.syntax.clone(),
            self.settings.environments.clone(),
        )
    }
}
