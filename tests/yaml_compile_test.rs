//! Tests for parsing, serializing and compiling configurations

use rstest::rstest;

use yamlenv::domain::{
    CompileError, Configuration, NodeDraft, Scalar, TreeArena, ValueType, VariableSyntax,
    YamlCompiler,
};
use yamlenv::util::testing;

fn compiler() -> YamlCompiler {
    testing::init_test_setup();
    YamlCompiler::default()
}

fn parse(text: &str) -> Configuration {
    compiler().parse_configuration(text).unwrap()
}

fn value_at(tree: &TreeArena, keys: &[&str]) -> Option<Scalar> {
    tree.resolve_keys(tree.root(), keys)
        .and_then(|idx| tree.data(idx))
        .and_then(|d| d.value.clone())
}

fn text_at(tree: &TreeArena, keys: &[&str]) -> String {
    match value_at(tree, keys) {
        Some(value) => value.to_string(),
        None => panic!("no value at {keys:?}"),
    }
}

// ============================================================
// Compilation
// ============================================================

#[test]
fn given_override_referencing_its_own_key_when_compiling_then_sees_inherited_value() {
    // Arrange
    let config = parse(
        r#"
default:
  db:
    host: local
    port: 5432
environments:
  prod:
    db:
      host: "${host}-prod"
"#,
    );

    // Act
    let yaml = compiler().compile_yaml("prod", &config).unwrap();
    let tree = compiler().compile_tree("prod", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["db", "host"]), "local-prod");
    assert_eq!(text_at(&tree, &["db", "port"]), "5432");
    assert!(yaml.contains("host: local-prod"), "{yaml}");
    assert!(yaml.contains("port: 5432"), "{yaml}");
}

#[test]
fn given_environment_without_overrides_when_compiling_then_output_equals_default() {
    // Arrange
    let config = parse(
        r#"
default:
  db:
    host: local
    port: 5432
  features:
    - search
    - export
  debug: false
environments:
  dev:
"#,
    );

    // Act
    let compiled = compiler().compile_yaml("dev", &config).unwrap();
    let default = compiler()
        .convert_tree_to_yaml(&config.default, true)
        .unwrap();

    // Assert
    assert_eq!(compiled, default);
}

#[test]
fn given_inherits_chain_when_compiling_then_layers_apply_from_root_most_ancestor() {
    // Arrange
    let config = parse(
        r#"
default:
  db:
    host: local
    port: 5432
    user: app
environments:
  base:
    db:
      port: 6000
      user: base
  qa:
    inherits: base
    db:
      host: qa-db
"#,
    );

    // Act
    let tree = compiler().compile_tree("qa", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["db", "host"]), "qa-db");
    assert_eq!(text_at(&tree, &["db", "port"]), "6000");
    assert_eq!(text_at(&tree, &["db", "user"]), "base");
    assert!(tree.child_by_key(tree.root(), "inherits").is_none());
}

#[rstest]
#[case("inherits: ~")]
#[case("inherits: ''")]
fn given_empty_inherits_when_compiling_then_no_parent_is_used(#[case] inherits: &str) {
    // Arrange
    let config = parse(&format!(
        "default:\n  host: local\nenvironments:\n  prod:\n    {}\n",
        inherits
    ));

    // Act
    let tree = compiler().compile_tree("prod", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["host"]), "local");
    assert!(tree.child_by_key(tree.root(), "inherits").is_none());
}

#[test]
fn given_inheritance_cycle_when_compiling_then_reports_chain() {
    // Arrange
    let config = parse(
        r#"
default:
  host: local
environments:
  a:
    inherits: b
  b:
    inherits: a
"#,
    );

    // Act
    let result = compiler().compile_yaml("a", &config);

    // Assert
    match result {
        Err(CompileError::InheritanceCycle { chain }) => {
            assert_eq!(chain, vec!["a", "b", "a"]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn given_missing_inherited_environment_when_compiling_then_fails() {
    // Arrange
    let config = parse(
        r#"
default:
  host: local
environments:
  prod:
    inherits: staging
"#,
    );

    // Act
    let result = compiler().compile_yaml("prod", &config);

    // Assert
    assert!(matches!(
        result,
        Err(CompileError::MissingInheritedEnvironment { ref environment, ref target })
            if environment == "prod" && target == "staging"
    ));
}

#[test]
fn given_non_string_inherits_when_compiling_then_fails() {
    let config = parse("default: {}\nenvironments:\n  prod:\n    inherits: 3\n");

    let result = compiler().compile_yaml("prod", &config);

    assert!(matches!(result, Err(CompileError::InvalidInherits(_))));
}

#[test]
fn given_unknown_environment_when_compiling_then_fails() {
    let config = parse("default:\n  host: local\n");

    let result = compiler().compile_yaml("prod", &config);

    assert!(matches!(result, Err(CompileError::UnknownEnvironment(ref e)) if e == "prod"));
}

#[test]
fn given_override_array_when_compiling_then_array_is_replaced() {
    // Arrange
    let config = parse(
        r#"
default:
  servers: [a, b]
environments:
  prod:
    servers: [c]
"#,
    );

    // Act
    let tree = compiler().compile_tree("prod", &config).unwrap();

    // Assert
    let servers = tree.child_by_key(tree.root(), "servers").unwrap();
    assert_eq!(tree.children(servers).len(), 1);
    assert_eq!(text_at(&tree, &["servers", "[0]"]), "c");
}

#[test]
fn given_scalar_override_of_object_when_compiling_then_shape_is_replaced() {
    let config = parse(
        r#"
default:
  cache:
    ttl: 10
environments:
  prod:
    cache: disabled
"#,
    );

    let tree = compiler().compile_tree("prod", &config).unwrap();

    assert_eq!(text_at(&tree, &["cache"]), "disabled");
}

// ============================================================
// Variables
// ============================================================

#[test]
fn given_sibling_and_outer_references_when_compiling_then_nearest_scope_wins() {
    // Arrange
    let config = parse(
        r#"
default:
  name: outer
  app:
    name: inner
    label: "${name}"
    greeting: "hello ${app_user}"
  app_user: root
environments:
  dev: {}
"#,
    );

    // Act
    let tree = compiler().compile_tree("dev", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["app", "label"]), "inner");
    assert_eq!(text_at(&tree, &["app", "greeting"]), "hello root");
}

#[test]
fn given_env_reference_without_property_when_compiling_then_expands_environment_name() {
    let config = parse("default:\n  bucket: \"data-${env}\"\nenvironments:\n  qa: {}\n");

    let tree = compiler().compile_tree("qa", &config).unwrap();

    assert_eq!(text_at(&tree, &["bucket"]), "data-qa");
}

#[test]
fn given_variable_chain_when_compiling_then_resolves_transitively() {
    let config = parse(
        r#"
default:
  domain: example.com
  host: "api.${domain}"
  url: "https://${host}/v1"
environments:
  prod:
    domain: example.org
"#,
    );

    let tree = compiler().compile_tree("prod", &config).unwrap();

    assert_eq!(text_at(&tree, &["url"]), "https://api.example.org/v1");
}

#[test]
fn given_number_reference_when_compiling_then_substitutes_its_text() {
    let config = parse("default:\n  port: 8080\n  url: \"http://h:${port}\"\nenvironments:\n  dev: {}\n");

    let tree = compiler().compile_tree("dev", &config).unwrap();

    assert_eq!(text_at(&tree, &["url"]), "http://h:8080");
    assert!(matches!(value_at(&tree, &["port"]), Some(Scalar::Number(_))));
}

#[test]
fn given_mutual_references_when_compiling_then_reports_variable_cycle() {
    let config = parse("default:\n  a: \"${b}\"\n  b: \"${a}\"\nenvironments:\n  dev: {}\n");

    let result = compiler().compile_yaml("dev", &config);

    assert!(matches!(result, Err(CompileError::VariableCycle { .. })), "{result:?}");
}

#[rstest]
#[case("default:\n  host: \"${host}\"\nenvironments:\n  dev: {}\n")]
#[case("default:\n  host: \"${missing}\"\nenvironments:\n  dev: {}\n")]
fn given_unresolvable_reference_when_compiling_then_fails(#[case] text: &str) {
    let config = parse(text);

    let result = compiler().compile_yaml("dev", &config);

    assert!(matches!(result, Err(CompileError::UnresolvedVariable { .. })), "{result:?}");
}

#[test]
fn given_reference_to_object_when_compiling_then_fails() {
    let config = parse("default:\n  db:\n    host: x\n  url: \"${db}\"\nenvironments:\n  dev: {}\n");

    let result = compiler().compile_yaml("dev", &config);

    assert!(matches!(result, Err(CompileError::NonScalarVariable { ref name, .. }) if name == "db"));
}

#[test]
fn given_custom_syntax_when_compiling_then_uses_its_markers() {
    // Arrange
    let config = parse("default:\n  host: local\n  url: \"{{host}}:${host}\"\nenvironments:\n  dev: {}\n");
    let compiler = YamlCompiler::new(VariableSyntax::new("{{", "}}").unwrap());

    // Act
    let tree = compiler.compile_tree("dev", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["url"]), "local:${host}");
    assert_eq!(compiler.construct_variable("host"), "{{host}}");
}

// ============================================================
// Anchors and aliases
// ============================================================

/// default db anchored as `db`; prod.replica aliases it and overrides host.
fn anchored_config() -> Configuration {
    let mut config = parse(
        r#"
default:
  db:
    host: local
    port: 5432
environments:
  prod: {}
"#,
    );
    let db = config.resolve_path("default.db").unwrap();
    config.default.data_mut(db.index).unwrap().anchor = Some("db".into());

    let prod = config.resolve_path("environments.prod").unwrap();
    config.environments.graft(
        prod.index,
        NodeDraft::object("replica")
            .with_alias("db")
            .with_child(NodeDraft::string("host", "replica-db")),
    );
    config
}

#[test]
fn given_alias_with_own_keys_when_compiling_then_own_keys_win_over_anchor() {
    // Arrange
    let config = anchored_config();

    // Act
    let tree = compiler().compile_tree("prod", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["replica", "host"]), "replica-db");
    assert_eq!(text_at(&tree, &["replica", "port"]), "5432");
    assert_eq!(text_at(&tree, &["db", "host"]), "local");
}

#[test]
fn given_anchored_configuration_when_serializing_then_emits_anchor_and_merge_key() {
    // Arrange
    let config = anchored_config();

    // Act
    let yaml = compiler().convert_configuration_to_yaml(&config).unwrap();

    // Assert
    assert!(yaml.contains("db: &db"), "{yaml}");
    assert!(yaml.contains("<<: *db"), "{yaml}");
    assert!(yaml.starts_with("default:"), "{yaml}");
}

#[test]
fn given_serialized_anchors_when_reloading_then_markers_survive_and_compile_expands_them() {
    // Arrange
    let yaml = compiler()
        .convert_configuration_to_yaml(&anchored_config())
        .unwrap();

    // Act
    let reloaded = parse(&yaml);

    // Assert
    let db = reloaded.resolve_path("default.db").unwrap();
    let replica = reloaded.resolve_path("environments.prod.replica").unwrap();
    assert_eq!(reloaded.data(db).unwrap().anchor.as_deref(), Some("db"));
    assert_eq!(reloaded.data(replica).unwrap().aliases, vec!["db".to_string()]);
    assert!(reloaded.resolve_path("environments.prod.replica.port").is_err());
    assert_eq!(reloaded.environment_names(), vec!["prod"]);

    let tree = compiler().compile_tree("prod", &reloaded).unwrap();
    assert_eq!(text_at(&tree, &["replica", "port"]), "5432");
    assert_eq!(text_at(&tree, &["replica", "host"]), "replica-db");
}

#[test]
fn given_overridden_anchor_when_compiling_then_alias_sees_final_value() {
    // Arrange
    let config = parse(
        r#"
default:
  db: &db
    host: local
    port: 5432
  replica: *db
environments:
  prod:
    db:
      host: prod-db
  dev: {}
"#,
    );

    // Act
    let prod = compiler().compile_tree("prod", &config).unwrap();
    let dev = compiler().compile_tree("dev", &config).unwrap();

    // Assert
    assert_eq!(text_at(&prod, &["db", "host"]), "prod-db");
    assert_eq!(text_at(&prod, &["replica", "host"]), "prod-db");
    assert_eq!(text_at(&prod, &["replica", "port"]), "5432");
    assert_eq!(text_at(&dev, &["replica", "host"]), "local");
}

#[test]
fn given_alias_overridden_by_environment_when_compiling_then_merges_over_final_anchor() {
    // Arrange
    let config = parse(
        r#"
default:
  db: &db
    host: local
    port: 5432
  replica:
    <<: *db
    host: replica-local
environments:
  prod:
    db:
      port: 6432
    replica:
      host: replica-prod
"#,
    );

    // Act
    let tree = compiler().compile_tree("prod", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["replica", "host"]), "replica-prod");
    assert_eq!(text_at(&tree, &["replica", "port"]), "6432");
}

#[test]
fn given_anchor_in_environment_outside_chain_when_aliased_then_expands_it() {
    // Arrange
    let config = parse(
        r#"
default: {}
environments:
  base:
    limits: &limits
      cpu: 2
  prod:
    limits: *limits
"#,
    );

    // Act
    let tree = compiler().compile_tree("prod", &config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["limits", "cpu"]), "2");
}

#[test]
fn given_shallow_merge_when_aliases_overlap_then_earlier_alias_wins() {
    // Arrange
    let mut config = parse("default:\n  a:\n    x: 1\n  b:\n    x: 2\n    y: 3\nenvironments:\n  dev: {}\n");
    let a = config.resolve_path("default.a").unwrap();
    let b = config.resolve_path("default.b").unwrap();
    config.default.data_mut(a.index).unwrap().anchor = Some("a".into());
    config.default.data_mut(b.index).unwrap().anchor = Some("b".into());
    let root = config.default.root();
    config.default.graft(
        root,
        NodeDraft::object("merged").with_alias("a").with_alias("b"),
    );

    // Act
    let tree = compiler().compile_tree("dev", &config).unwrap();
    let yaml = compiler().convert_configuration_to_yaml(&config).unwrap();

    // Assert
    assert_eq!(text_at(&tree, &["merged", "x"]), "1");
    assert_eq!(text_at(&tree, &["merged", "y"]), "3");
    assert!(yaml.contains("<<: [*a, *b]"), "{yaml}");
}

#[test]
fn given_alias_to_undeclared_anchor_when_serializing_then_validation_fails() {
    // Arrange
    let mut config = parse("default:\n  host: local\nenvironments:\n  prod: {}\n");
    let prod = config.resolve_path("environments.prod").unwrap();
    config
        .environments
        .graft(prod.index, NodeDraft::object("db").with_alias("missing"));

    // Act
    let saved = compiler().convert_configuration_to_yaml(&config);
    let preview = compiler().convert_tree_to_yaml(&config.environments, false);
    let compiled = compiler().compile_yaml("prod", &config);

    // Assert
    assert!(matches!(saved, Err(CompileError::UnresolvedAlias { ref alias, .. }) if alias == "missing"));
    assert!(preview.is_ok());
    assert!(matches!(compiled, Err(CompileError::UnresolvedAlias { .. })));
}

#[test]
fn given_alias_before_its_anchor_in_document_order_when_validating_then_fails() {
    // Arrange
    let mut config = parse("default:\n  first: {}\n  second:\n    k: v\nenvironments: {}\n");
    let first = config.resolve_path("default.first").unwrap();
    let second = config.resolve_path("default.second").unwrap();
    config.default.data_mut(first.index).unwrap().aliases = vec!["late".into()];
    config.default.data_mut(second.index).unwrap().anchor = Some("late".into());

    // Act
    let result = compiler().convert_configuration_to_yaml(&config);

    // Assert
    assert!(matches!(result, Err(CompileError::UnresolvedAlias { .. })));
}

#[test]
fn given_self_referencing_alias_when_compiling_then_reports_alias_cycle() {
    // Arrange
    let mut config = parse("default:\n  loop:\n    k: v\nenvironments:\n  dev: {}\n");
    let node = config.resolve_path("default.loop").unwrap();
    let data = config.default.data_mut(node.index).unwrap();
    data.anchor = Some("loop".into());
    data.aliases = vec!["loop".into()];

    // Act
    let result = compiler().compile_yaml("dev", &config);

    // Assert
    assert!(matches!(result, Err(CompileError::AliasCycle { .. })), "{result:?}");
}

// ============================================================
// Parsing and emission
// ============================================================

#[test]
fn given_yaml_anchors_when_parsing_then_merge_keys_become_aliases() {
    // Arrange
    let text = r#"
default:
  base: &base
    host: local
    port: 5432
  replica:
    <<: *base
    host: replica
  copy: *base
environments: {}
"#;

    // Act
    let config = parse(text);

    // Assert
    let base = config.resolve_path("default.base").unwrap();
    let replica = config.resolve_path("default.replica").unwrap();
    let copy = config.resolve_path("default.copy").unwrap();
    assert_eq!(config.data(base).unwrap().anchor.as_deref(), Some("base"));
    assert_eq!(config.data(replica).unwrap().aliases, vec!["base".to_string()]);
    assert_eq!(config.data(copy).unwrap().aliases, vec!["base".to_string()]);
    assert_eq!(config.data(copy).unwrap().value_type, ValueType::Object);
    assert_eq!(config.default.children(replica.index).len(), 1);

    let host = config.resolve_path("default.replica.host").unwrap();
    assert_eq!(
        config.data(host).and_then(|d| d.value.clone()),
        Some(Scalar::String("replica".into()))
    );
}

#[test]
fn given_merge_key_list_and_scalar_anchor_when_parsing_then_keeps_both() {
    // Arrange
    let text = r#"
default:
  a: &a
    x: 1
  b: &b
    y: 2
  port: &port 5432
  merged:
    <<: [*a, *b]
  other_port: *port
"#;

    // Act
    let config = parse(text);

    // Assert
    let merged = config.resolve_path("default.merged").unwrap();
    let port = config.resolve_path("default.port").unwrap();
    let other_port = config.resolve_path("default.other_port").unwrap();
    assert_eq!(config.data(merged).unwrap().aliases, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(config.data(port).unwrap().anchor.as_deref(), Some("port"));
    assert_eq!(config.data(other_port).unwrap().value_type, ValueType::Number);
    assert_eq!(config.data(other_port).unwrap().aliases, vec!["port".to_string()]);
}

#[test]
fn given_comment_lines_when_parsing_then_attach_to_next_entry() {
    // Arrange
    let text = r#"
# file header
default:
  # database settings
  # shared by all environments
  db:
    host: local
  servers:
    # primary
    - name: a
    - name: b
environments: {}
"#;

    // Act
    let config = parse(text);

    // Assert
    let db = config.resolve_path("default.db").unwrap();
    let host = config.resolve_path("default.db.host").unwrap();
    let first = config.resolve_path("default.servers[0]").unwrap();
    let second = config.resolve_path("default.servers[1]").unwrap();
    assert_eq!(
        config.data(db).unwrap().comment.as_deref(),
        Some("database settings\nshared by all environments")
    );
    assert_eq!(config.data(host).unwrap().comment, None);
    assert_eq!(config.data(first).unwrap().comment.as_deref(), Some("primary"));
    assert_eq!(config.data(second).unwrap().comment, None);
}

#[test]
fn given_item_whose_first_key_has_comment_when_emitting_then_comment_reloads_on_that_key() {
    // Arrange
    let mut config = parse("default:\n  servers: []\nenvironments: {}\n");
    let servers = config.resolve_path("default.servers").unwrap();
    config.default.graft(
        servers.index,
        NodeDraft::object("[0]").with_child(NodeDraft::string("name", "a").with_comment("primary")),
    );

    // Act
    let yaml = compiler().convert_configuration_to_yaml(&config).unwrap();
    let reloaded = parse(&yaml);

    // Assert
    assert!(yaml.contains("    -\n      # primary\n      name: a"), "{yaml}");
    let item = reloaded.resolve_path("default.servers[0]").unwrap();
    let name = reloaded.resolve_path("default.servers[0].name").unwrap();
    assert_eq!(reloaded.data(item).unwrap().comment, None);
    assert_eq!(reloaded.data(name).unwrap().comment.as_deref(), Some("primary"));
}

#[rstest]
#[case("other: {}\n")]
#[case("- a\n- b\n")]
#[case("default: 3\n")]
#[case("environments:\n  prod: 3\n")]
#[case("default: [unclosed\n")]
fn given_malformed_document_when_parsing_then_fails(#[case] text: &str) {
    let result = compiler().parse_configuration(text);

    assert!(matches!(result, Err(CompileError::InvalidYaml(_))), "{result:?}");
}

#[test]
fn given_empty_document_when_parsing_then_both_trees_are_empty() {
    let config = parse("");

    assert!(config.default.is_leaf(config.default.root()));
    assert!(config.environment_names().is_empty());
}

#[test]
fn given_comments_and_ambiguous_strings_when_serializing_then_reparse_is_lossless() {
    // Arrange
    let mut config = Configuration::new();
    let root = config.default.root();
    config.default.graft(
        root,
        NodeDraft::object("flags")
            .with_comment("feature switches")
            .with_child(NodeDraft::string("enabled", "true"))
            .with_child(NodeDraft::string("port", "5432"))
            .with_child(NodeDraft::string("empty", ""))
            .with_child(NodeDraft::boolean("real", true)),
    );

    // Act
    let yaml = compiler().convert_configuration_to_yaml(&config).unwrap();
    let reloaded = parse(&yaml);

    // Assert
    assert!(yaml.contains("# feature switches"), "{yaml}");
    let enabled = reloaded.resolve_path("default.flags.enabled").unwrap();
    let real = reloaded.resolve_path("default.flags.real").unwrap();
    let empty = reloaded.resolve_path("default.flags.empty").unwrap();
    assert_eq!(reloaded.data(enabled).unwrap().value_type, ValueType::String);
    assert_eq!(reloaded.data(real).unwrap().value_type, ValueType::Boolean);
    assert_eq!(
        reloaded.data(empty).and_then(|d| d.value.clone()),
        Some(Scalar::String(String::new()))
    );
}

#[test]
fn given_empty_containers_when_serializing_then_uses_flow_markers() {
    let mut config = Configuration::new();
    let root = config.default.root();
    config.default.graft(root, NodeDraft::object("obj"));
    config.default.graft(root, NodeDraft::array("list"));

    let yaml = compiler().convert_tree_to_yaml(&config.default, true).unwrap();

    assert_eq!(yaml, "obj: {}\nlist: []\n");
}
