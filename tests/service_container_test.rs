//! Tests for ServiceContainer wiring with mock dependencies

use std::sync::{Arc, Mutex};

use yamlenv::config::{Settings, VariablesConfig};
use yamlenv::domain::YamlCompiler;
use yamlenv::infrastructure::di::ServiceContainer;
use yamlenv::infrastructure::traits::{
    Alert, AlertSink, RealFileSystem, SelectionItem, Selector,
};

/// Mock selector that returns a predetermined selection
struct MockSelector {
    selection: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl Selector for MockSelector {
    fn select_one(
        &self,
        items: &[SelectionItem],
        _prompt: &str,
    ) -> Result<Option<SelectionItem>, String> {
        let mut seen = self.seen.lock().unwrap();
        seen.extend(items.iter().map(|i| i.value.clone()));
        Ok(self
            .selection
            .as_ref()
            .and_then(|s| items.iter().find(|i| &i.value == s).cloned()))
    }
}

#[derive(Default)]
struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn alert(&self, _alert: Alert) {}
}

fn settings() -> Settings {
    Settings {
        environments: vec!["dev".into(), "live".into()],
        variables: VariablesConfig {
            prefix: "{{".into(),
            suffix: "}}".into(),
        },
        ..Settings::default()
    }
}

fn container(selector: Arc<MockSelector>) -> ServiceContainer {
    ServiceContainer::with_deps(
        settings(),
        Arc::new(RealFileSystem),
        Arc::new(NullAlertSink),
        selector,
    )
    .unwrap()
}

#[test]
fn given_custom_variable_syntax_when_compiling_through_container_then_uses_it() {
    // Arrange
    let container = container(Arc::new(MockSelector {
        selection: None,
        seen: Mutex::new(Vec::new()),
    }));
    let config = YamlCompiler::default()
        .parse_configuration("default:\n  host: local\n  url: \"{{host}}:80\"\nenvironments:\n  dev: {}\n")
        .unwrap();

    // Act
    let yaml = container.config_service().compile("dev", &config).unwrap();

    // Assert
    assert!(yaml.contains("local:80"), "{yaml}");
}

#[test]
fn given_configured_environments_when_composing_then_offers_missing_ones() {
    // Arrange
    let container = container(Arc::new(MockSelector {
        selection: None,
        seen: Mutex::new(Vec::new()),
    }));
    let config = YamlCompiler::default()
        .parse_configuration("default: {}\nenvironments:\n  dev: {}\n")
        .unwrap();
    let root = config.environments_root();
    let mut session = container.edit_session(config);

    // Act
    let property = session.compose(root, false).unwrap();

    // Assert
    let keys: Vec<&str> = property.key_options.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["live"]);
}

#[test]
fn given_mock_selector_when_selecting_then_returns_configured_item() {
    // Arrange
    let selector = Arc::new(MockSelector {
        selection: Some("qa".into()),
        seen: Mutex::new(Vec::new()),
    });
    let container = container(selector.clone());
    let items: Vec<SelectionItem> = ["dev", "qa"]
        .iter()
        .map(|name| SelectionItem {
            display: name.to_string(),
            value: name.to_string(),
        })
        .collect();

    // Act
    let selected = container.selector.select_one(&items, "environment> ").unwrap();

    // Assert
    assert_eq!(selected.map(|i| i.value), Some("qa".to_string()));
    assert_eq!(*selector.seen.lock().unwrap(), vec!["dev", "qa"]);
}

#[test]
fn given_invalid_variable_syntax_when_wiring_then_fails() {
    let mut settings = settings();
    settings.variables.suffix = String::new();

    let result = ServiceContainer::with_deps(
        settings,
        Arc::new(RealFileSystem),
        Arc::new(NullAlertSink),
        Arc::new(MockSelector {
            selection: None,
            seen: Mutex::new(Vec::new()),
        }),
    );

    assert!(result.is_err());
}
