//! Soukai - An Active Record object-document mapper with RDF support
//!
//! Soukai maps typed models with declared relations onto a pluggable
//! storage engine, and maps RDF models onto JSON-LD documents with
//! CRDT-style operation history.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture, leaves first:
//!
//! - [`core`] - Strong types (urls, dates, attribute values) and configuration
//! - [`schema`] - Field definitions, model schemas and their validation
//! - [`engine`] - The storage boundary, an in-memory engine, caching and scoped overrides
//! - [`rdf`] - Quads, Turtle, JSON-LD documents and the model mapper
//! - [`history`] - CRDT operations, replay and merge
//! - [`model`] - Attribute store, model instances, registry and persistence
//! - [`relations`] - Relation declarations and their resolution
//! - [`errors`] - The public error taxonomy
//!
//! # Invariants
//!
//! 1. Schemas are validated once, at definition time, and frozen at boot
//! 2. A model that exists always has a primary key and a persisted snapshot
//! 3. Models only reach storage through the [`engine::Engine`] trait
//! 4. Replaying an operation twice changes nothing
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use soukai::attributes;
//! use soukai::engine::InMemoryEngine;
//! use soukai::model::ModelRegistry;
//! use soukai::schema::{FieldDefinition, ModelSchema};
//!
//! # tokio_test::block_on(async {
//! let registry = ModelRegistry::new();
//! registry.set_engine(Some(Arc::new(InMemoryEngine::new())));
//!
//! let person = registry
//!     .boot(
//!         ModelSchema::builder("Person")
//!             .rdf_context("foaf", "http://xmlns.com/foaf/0.1/")
//!             .rdf_class("foaf:Person")
//!             .collection("https://pod.example/people/")
//!             .field("name", FieldDefinition::string().rdf_property("foaf:name"))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let alice = person.create(attributes! { "name" => "Alice" }).await.unwrap();
//! assert!(alice.to_turtle().unwrap().contains("foaf:name \"Alice\""));
//! # });
//! ```

pub mod core;
pub mod engine;
pub mod errors;
pub mod history;
pub mod model;
pub mod rdf;
pub mod relations;
pub mod schema;

pub use crate::core::types::Url;
pub use crate::core::value::{AttributeValue, Attributes};
pub use errors::{Result, SoukaiError};
pub use model::{Model, ModelClass, ModelRegistry};
