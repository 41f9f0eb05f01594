//! Tests for key options offered when adding or editing a property

use rstest::{fixture, rstest};

use yamlenv::domain::{key_options, Configuration, KeyOption, ValueType, YamlCompiler};

const CONFIG: &str = r#"
default:
  db:
    host: local
    port: 5432
  debug: false
  servers:
    - name: a
environments:
  prod:
    db:
      host: prod-db
  qa:
    servers:
      - {}
"#;

#[fixture]
fn config() -> Configuration {
    YamlCompiler::default().parse_configuration(CONFIG).unwrap()
}

fn environments() -> Vec<String> {
    vec!["dev".into(), "qa".into(), "prod".into()]
}

fn options_at(config: &Configuration, path: &str, edit_mode: bool) -> Vec<KeyOption> {
    let node = config.resolve_path(path).unwrap();
    key_options(config, node, edit_mode, false, &environments())
}

#[rstest]
fn given_environments_root_when_adding_then_offers_missing_environments(config: Configuration) {
    // Act
    let options = options_at(&config, "environments", false);

    // Assert
    assert_eq!(options, vec![KeyOption::new("dev", ValueType::Object)]);
}

#[rstest]
fn given_env_file_mode_when_adding_environment_then_names_are_free_form(config: Configuration) {
    // Arrange
    let root = config.environments_root();

    // Act
    let options = key_options(&config, root, false, true, &environments());

    // Assert
    assert!(options.is_empty());
}

#[rstest]
fn given_environment_when_adding_then_offers_inherits_and_missing_top_level_keys(
    config: Configuration,
) {
    // Act
    let options = options_at(&config, "environments.prod", false);

    // Assert
    assert_eq!(
        options,
        vec![
            KeyOption::new("inherits", ValueType::String),
            KeyOption::new("debug", ValueType::Boolean),
            KeyOption::new("servers", ValueType::Array),
        ]
    );
}

#[rstest]
fn given_nested_override_when_adding_then_offers_missing_default_siblings(config: Configuration) {
    // Act
    let options = options_at(&config, "environments.prod.db", false);

    // Assert
    assert_eq!(options, vec![KeyOption::new("port", ValueType::Number)]);
}

#[rstest]
fn given_override_array_when_adding_then_offers_next_position_with_item_type(
    config: Configuration,
) {
    // Act
    let options = options_at(&config, "environments.qa.servers", false);

    // Assert
    assert_eq!(options, vec![KeyOption::new("[1]", ValueType::Object)]);
}

#[rstest]
fn given_object_in_override_array_when_adding_then_offers_first_default_item_keys(
    config: Configuration,
) {
    // Act
    let options = options_at(&config, "environments.qa.servers[0]", false);

    // Assert
    assert_eq!(options, vec![KeyOption::new("name", ValueType::String)]);
}

#[rstest]
#[case("environments.prod.db.host", "host", ValueType::String)]
#[case("environments.prod", "prod", ValueType::Object)]
fn given_edit_mode_when_listing_then_offers_only_current_key(
    config: Configuration,
    #[case] path: &str,
    #[case] key: &str,
    #[case] value_type: ValueType,
) {
    // Act
    let options = options_at(&config, path, true);

    // Assert
    assert_eq!(options, vec![KeyOption::new(key, value_type)]);
}

#[rstest]
#[case("default")]
#[case("default.db")]
fn given_default_tree_node_when_adding_then_keys_are_free_form(
    config: Configuration,
    #[case] path: &str,
) {
    assert!(options_at(&config, path, false).is_empty());
}

#[rstest]
fn given_override_path_missing_in_default_when_adding_then_offers_nothing(
    config: Configuration,
) {
    // Arrange
    let mut config = config;
    let prod = config.resolve_path("environments.prod").unwrap();
    config
        .environments
        .graft(prod.index, yamlenv::domain::NodeDraft::object("cache"));

    // Act
    let options = options_at(&config, "environments.prod.cache", false);

    // Assert
    assert!(options.is_empty());
}
