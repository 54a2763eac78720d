//! model
//!
//! Model classes and instances.
//!
//! # Modules
//!
//! - [`attributes`] - Attribute store: current values, persisted snapshot, existence
//! - [`instance`] - `Model` instances and typed accessors
//! - [`registry`] - Booting, lookup and reset of model classes
//! - [`persistence`] - save, delete, find and history sync
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
//! let schema = ModelSchema::builder("Person")
//!     .field("name", FieldDefinition::string().required())
//!     .build()
//!     .unwrap();
//! let person = registry.boot(schema).unwrap();
//!
//! let alice = person.create(attributes! { "name" => "Alice" }).await.unwrap();
//! let found = person.find(alice.key().unwrap()).await.unwrap().unwrap();
//! assert_eq!(found.get_str("name"), Some("Alice"));
//! # });
//! ```

pub mod attributes;
pub mod instance;
pub mod persistence;
pub mod registry;

pub use attributes::AttributeStore;
pub use instance::Model;
pub use persistence::FindResult;
pub use registry::{
    boot_models, global_registry, require_booted_model, reset_models, BootedModel, ModelClass,
    ModelRegistry,
};
