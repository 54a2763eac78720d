//! Integration tests for booting models and configuring registries.

mod common;

use std::io::Write;
use std::sync::Arc;

use common::{person_schema, post_schema, TestStore};
use soukai::attributes;
use soukai::core::config::Config;
use soukai::engine::{Engine, InMemoryEngine};
use soukai::model::{boot_models, global_registry, require_booted_model, reset_models, ModelRegistry};
use soukai::schema::FieldDefinition;

// =============================================================================
// Booting
// =============================================================================

#[test]
fn booting_twice_fails_until_reset() {
    let store = TestStore::new();
    let schema = person_schema();

    store.registry.boot(schema.clone()).unwrap();
    let error = store.registry.boot(schema.clone()).unwrap_err();
    assert!(error.to_string().contains("already booted"));

    store.registry.reset();
    assert!(store.registry.names().is_empty());
    store.registry.boot(schema).unwrap();
}

#[test]
fn relations_resolve_booted_classes() {
    let store = TestStore::new();
    let post = store.boot(post_schema());

    let declaration = post.schema().relation("author").unwrap().clone();
    assert!(post.resolve(&declaration.related).is_err());

    let person = store.boot(person_schema());
    let resolved = post.resolve(&declaration.related).unwrap();
    assert!(Arc::ptr_eq(&resolved, &person));
}

#[tokio::test]
async fn classes_without_engines_cannot_save() {
    let registry = ModelRegistry::new();
    let person = registry.boot(person_schema()).unwrap();

    let result = person.create(attributes! { "name" => "Alice" }).await;

    assert!(result.is_err());
}

#[test]
fn global_registry_lifecycle() {
    reset_models();

    let booted = boot_models([("Person", person_schema()), ("Post", post_schema())]).unwrap();
    assert_eq!(booted.len(), 2);
    assert_eq!(require_booted_model("Post").unwrap().collection(), "https://pod.example/posts/");
    assert!(global_registry().get("Person").is_some());

    reset_models();
    assert!(require_booted_model("Person").is_err());
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn configuration_files_set_schema_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[models]
timestamps = false
default_resource_hash = "me"
history = true

[cache]
enabled = false

[rdf.prefixes]
foaf = "http://xmlns.com/foaf/0.1/"
"#
    )
    .unwrap();

    let config = Config::load_from(file.path()).unwrap();
    assert_eq!(config.path(), Some(file.path()));

    let registry = ModelRegistry::with_config(config);
    let schema = registry
        .schema("Person")
        .rdf_class("foaf:Person")
        .field("name", FieldDefinition::string().rdf_property("foaf:name"))
        .build()
        .unwrap();

    assert!(schema.history());
    assert_eq!(schema.default_resource_hash(), "me");
    assert!(schema.field("createdAt").is_none());
    assert_eq!(schema.rdf_classes().to_vec(), vec!["http://xmlns.com/foaf/0.1/Person".to_string()]);
}

#[test]
fn unknown_configuration_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[models]\nhistroy = true\n").unwrap();

    assert!(Config::load_from(&path).is_err());
    assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn configured_engines_are_cached_by_default() {
    let registry = ModelRegistry::with_config(Config::default());
    registry.configure_engine(Arc::new(InMemoryEngine::new()));
    assert_eq!(registry.engine().map(|engine| engine.name()), Some("cached"));

    let registry = ModelRegistry::with_config(Config::from_toml("[cache]\nenabled = false\n").unwrap());
    registry.configure_engine(Arc::new(InMemoryEngine::new()));
    assert_eq!(registry.engine().map(|engine| engine.name()), Some("memory"));
}
