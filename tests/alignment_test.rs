//! Tests for environment alignment after default-tree edits

use yamlenv::domain::alignment::{
    align_anchor_removal, align_anchor_rename, align_deletion, align_environment_properties,
    align_key_rename, align_type_change, rename_alias,
};
use yamlenv::domain::{Configuration, NodeRef, Scalar, VariableSyntax, YamlCompiler};

const CONFIG: &str = r#"
default:
  db:
    host: local
    url: "postgres://${host}:5432"
  servers:
    - name: a
environments:
  prod:
    db:
      host: "${host}-prod"
  qa:
    db:
      host: qa-db
      url: "jdbc://${host}"
  dev: {}
"#;

fn load() -> Configuration {
    YamlCompiler::default().parse_configuration(CONFIG).unwrap()
}

fn node(config: &Configuration, path: &str) -> NodeRef {
    config.resolve_path(path).unwrap()
}

fn string_value(config: &Configuration, path: &str) -> String {
    match config.data(node(config, path)).and_then(|d| d.value.clone()) {
        Some(Scalar::String(s)) => s,
        other => panic!("expected string at {path}, got {other:?}"),
    }
}

fn syntax() -> VariableSyntax {
    VariableSyntax::default()
}

#[test]
fn given_empty_path_when_aligning_then_nothing_matches() {
    // Arrange
    let mut config = load();
    let mut calls = 0;

    // Act
    let matched = align_environment_properties(&mut config.environments, &[], |_, _| calls += 1);

    // Assert
    assert_eq!(matched, 0);
    assert_eq!(calls, 0);
}

#[test]
fn given_sparse_overrides_when_aligning_then_visits_only_existing_nodes() {
    // Arrange
    let mut config = load();
    let paths: Vec<String> = vec!["db".into(), "url".into()];
    let mut visited = Vec::new();

    // Act
    let matched = align_environment_properties(&mut config.environments, &paths, |envs, idx| {
        visited.push(envs.path_string(idx));
    });

    // Assert
    assert_eq!(matched, 1);
    assert_eq!(visited, vec!["environments.qa.db.url"]);
}

#[test]
fn given_type_change_when_aligning_then_removes_overrides_in_every_environment() {
    // Arrange
    let mut config = load();
    let host = node(&config, "default.db.host");

    // Act
    let removed = align_type_change(&mut config, host.index);

    // Assert
    assert_eq!(removed, 2);
    assert!(config.resolve_path("environments.prod.db.host").is_err());
    assert!(config.resolve_path("environments.qa.db.host").is_err());
    assert!(config.resolve_path("environments.qa.db.url").is_ok());
    assert!(config.resolve_path("default.db.host").is_ok());
}

#[test]
fn given_array_type_change_when_aligning_then_default_items_are_dropped() {
    // Arrange
    let mut config = load();
    let servers = node(&config, "default.servers");

    // Act
    align_type_change(&mut config, servers.index);

    // Assert
    assert!(config.default.children(servers.index).is_empty());
}

#[test]
fn given_key_rename_when_aligning_then_overrides_and_references_follow() {
    // Arrange
    let mut config = load();
    let host = node(&config, "default.db.host");

    // Act
    let renamed = align_key_rename(&mut config, host.index, "hostname", &syntax());

    // Assert
    assert_eq!(renamed, 2);
    assert!(config.resolve_path("environments.prod.db.hostname").is_ok());
    assert!(config.resolve_path("environments.qa.db.hostname").is_ok());
    assert_eq!(string_value(&config, "default.db.url"), "postgres://${hostname}:5432");
    assert_eq!(string_value(&config, "environments.qa.db.url"), "jdbc://${hostname}");
    assert_eq!(string_value(&config, "environments.prod.db.hostname"), "${hostname}-prod");
    // live default key is renamed by the caller
    assert_eq!(config.default.key(host.index), Some("host"));
}

#[test]
fn given_custom_syntax_when_renaming_then_only_matching_markers_change() {
    // Arrange
    let mut config = YamlCompiler::default()
        .parse_configuration(
            r#"
default:
  host: local
  url: "{{host}} ${host}"
"#,
        )
        .unwrap();
    let host = node(&config, "default.host");
    let custom = VariableSyntax::new("{{", "}}").unwrap();

    // Act
    align_key_rename(&mut config, host.index, "server", &custom);

    // Assert
    assert_eq!(string_value(&config, "default.url"), "{{server}} ${host}");
}

#[test]
fn given_deleted_default_node_when_aligning_then_overrides_are_removed() {
    // Arrange
    let mut config = load();
    let paths = vec!["db".to_string()];

    // Act
    let removed = align_deletion(&mut config, &paths);

    // Assert
    assert_eq!(removed, 2);
    assert!(config.resolve_path("environments.prod.db").is_err());
    assert!(config.resolve_path("environments.qa.db").is_err());
    assert!(config.resolve_path("environments.dev").is_ok());
}

#[test]
fn given_aliases_when_renaming_anchor_then_every_tree_follows_and_order_is_kept() {
    // Arrange
    let mut config = load();
    let prod_db = node(&config, "environments.prod.db");
    let qa_db = node(&config, "environments.qa.db");
    let servers = node(&config, "default.servers");
    config.environments.data_mut(prod_db.index).unwrap().aliases =
        vec!["base".into(), "extra".into()];
    config.environments.data_mut(qa_db.index).unwrap().aliases = vec!["extra".into()];
    config.default.data_mut(servers.index).unwrap().aliases = vec!["base".into()];

    // Act
    let changed = align_anchor_rename(&mut config, "base", "core");

    // Assert
    assert_eq!(changed, 2);
    assert_eq!(
        config.data(prod_db).unwrap().aliases,
        vec!["core".to_string(), "extra".to_string()]
    );
    assert_eq!(config.data(qa_db).unwrap().aliases, vec!["extra".to_string()]);
    assert_eq!(config.data(servers).unwrap().aliases, vec!["core".to_string()]);
}

#[test]
fn given_alias_list_with_new_name_when_renaming_then_entry_is_not_duplicated() {
    // Arrange
    let mut config = load();
    let prod_db = node(&config, "environments.prod.db");
    config.environments.data_mut(prod_db.index).unwrap().aliases =
        vec!["old".into(), "new".into()];

    // Act
    rename_alias(&mut config.environments, "old", "new");

    // Assert
    assert_eq!(config.data(prod_db).unwrap().aliases, vec!["new".to_string()]);
}

#[test]
fn given_removed_anchor_when_aligning_then_alias_entries_are_stripped() {
    // Arrange
    let mut config = load();
    let prod_db = node(&config, "environments.prod.db");
    config.environments.data_mut(prod_db.index).unwrap().aliases =
        vec!["base".into(), "extra".into()];

    // Act
    let changed = align_anchor_removal(&mut config, "base");

    // Assert
    assert_eq!(changed, 1);
    assert_eq!(config.data(prod_db).unwrap().aliases, vec!["extra".to_string()]);
    assert!(config.resolve_path("environments.prod.db.host").is_ok());
}
