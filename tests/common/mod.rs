//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use soukai::engine::InMemoryEngine;
use soukai::model::{ModelClass, ModelRegistry};
use soukai::relations::{OnDelete, RelationDeclaration};
use soukai::schema::{FieldDefinition, ModelSchema};

pub const PEOPLE: &str = "https://pod.example/people/";
pub const POSTS: &str = "https://pod.example/posts/";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
pub const SCHEMA: &str = "https://schema.org/";

// =============================================================================
// Test Store
// =============================================================================

/// A registry of its own, backed by an in-memory engine.
pub struct TestStore {
    pub registry: Arc<ModelRegistry>,
    pub engine: InMemoryEngine,
}

impl TestStore {
    pub fn new() -> Self {
        let registry = ModelRegistry::new();
        let engine = InMemoryEngine::new();
        registry.set_engine(Some(Arc::new(engine.clone())));
        Self { registry, engine }
    }

    pub fn boot(&self, schema: ModelSchema) -> ModelClass {
        self.registry.boot(schema).expect("boot model")
    }
}

// =============================================================================
// Schemas
// =============================================================================

pub fn person_schema() -> ModelSchema {
    ModelSchema::builder("Person")
        .rdf_context("foaf", FOAF)
        .rdf_class("foaf:Person")
        .collection(PEOPLE)
        .field("name", FieldDefinition::string().required().rdf_property("foaf:name"))
        .field("age", FieldDefinition::number().rdf_property("foaf:age"))
        .field(
            "friendUrls",
            FieldDefinition::array(FieldDefinition::key()).rdf_property("foaf:knows"),
        )
        .relation(
            "posts",
            RelationDeclaration::has_many("Post", "authorUrl").on_delete(OnDelete::Cascade),
        )
        .build()
        .expect("person schema")
}

pub fn post_schema() -> ModelSchema {
    ModelSchema::builder("Post")
        .rdf_context("schema", SCHEMA)
        .rdf_class("schema:Article")
        .collection(POSTS)
        .field("title", FieldDefinition::string().required().rdf_property("schema:name"))
        .field("authorUrl", FieldDefinition::key().rdf_property("schema:author"))
        .belongs_to_one("author", "Person", "authorUrl")
        .build()
        .expect("post schema")
}

/// A store with `Person` and `Post` booted.
pub fn blog() -> (TestStore, ModelClass, ModelClass) {
    let store = TestStore::new();
    let person = store.boot(person_schema());
    let post = store.boot(post_schema());
    (store, person, post)
}
