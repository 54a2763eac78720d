//! engine::traits
//!
//! Engine trait definition for storage backends.
//!
//! # Design
//!
//! The `Engine` trait is async because storage involves I/O. Documents
//! are JSON objects grouped in named collections and addressed by id.
//! Models never talk to storage except through this trait.
//!
//! Engines:
//! - Own persistence of serialized documents
//! - Fail `create` with `DocumentAlreadyExists` when an id is taken
//! - Fail `read_one`/`update`/`delete` with `DocumentNotFound` for unknown ids
//!
//! # Example
//!
//! ```
//! use soukai::engine::{Engine, EngineError, InMemoryEngine};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let engine = InMemoryEngine::new();
//! let document = json!({"name": "Alice"}).as_object().unwrap().clone();
//!
//! let id = engine.create("people", document, Some("alice")).await.unwrap();
//! assert_eq!(id, "alice");
//!
//! let read = engine.read_one("people", "alice").await.unwrap();
//! assert_eq!(read["name"], "Alice");
//! # });
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A stored document.
pub type Document = serde_json::Map<String, Value>;

/// Documents keyed by id, as returned by `read_many`.
pub type Documents = BTreeMap<String, Document>;

/// Errors from engine operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// `create` was called with an id that is already used.
    #[error("document '{id}' already exists in collection '{collection}'")]
    DocumentAlreadyExists { collection: String, id: String },

    /// The addressed document does not exist.
    #[error("document '{id}' not found in collection '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    /// Any other storage failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl EngineError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        EngineError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(collection: &str, id: &str) -> Self {
        EngineError::DocumentAlreadyExists {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Condition on a single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Field equals the value
    Equals(Value),
    /// Field is an array containing the value
    Contains(Value),
    /// Field equals one of the values
    In(Vec<Value>),
}

impl FieldFilter {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (FieldFilter::Equals(expected), Some(actual)) => expected == actual,
            (FieldFilter::Contains(expected), Some(Value::Array(items))) => {
                items.contains(expected)
            }
            (FieldFilter::In(candidates), Some(actual)) => candidates.contains(actual),
            _ => false,
        }
    }
}

/// Filters for `read_many`.
///
/// All conditions must hold. `ids` restricts the result to the given
/// document ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub ids: Option<Vec<String>>,
    pub fields: BTreeMap<String, FieldFilter>,
}

impl Filters {
    /// Filter documents by id.
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field condition.
    pub fn with_field(mut self, field: impl Into<String>, filter: FieldFilter) -> Self {
        self.fields.insert(field.into(), filter);
        self
    }

    /// Whether a document satisfies every condition.
    pub fn matches(&self, id: &str, document: &Document) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|candidate| candidate == id) {
                return false;
            }
        }

        self.fields
            .iter()
            .all(|(field, filter)| filter.matches(document.get(field)))
    }
}

/// Partial document update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    /// Top-level keys to overwrite
    pub set: Document,
    /// Top-level keys to remove
    pub unset: Vec<String>,
}

impl Updates {
    /// Replace the whole document content.
    pub fn replace(document: Document) -> Self {
        Self {
            set: document,
            unset: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Apply the updates to a document in place.
    pub fn apply(&self, document: &mut Document) {
        for key in &self.unset {
            document.remove(key);
        }
        for (key, value) in &self.set {
            document.insert(key.clone(), value.clone());
        }
    }
}

/// A storage backend.
///
/// Implementations must be `Send + Sync` so model classes can share them
/// across tasks.
#[async_trait]
pub trait Engine: Send + Sync + std::fmt::Debug {
    /// Engine name for logging.
    fn name(&self) -> &'static str;

    /// Store a new document, returning its id.
    ///
    /// When `id` is `None` the engine mints one.
    async fn create(
        &self,
        collection: &str,
        document: Document,
        id: Option<&str>,
    ) -> Result<String, EngineError>;

    /// Read a single document.
    async fn read_one(&self, collection: &str, id: &str) -> Result<Document, EngineError>;

    /// Read every document in a collection matching the filters.
    async fn read_many(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<Documents, EngineError>;

    /// Apply a partial update to a document.
    async fn update(&self, collection: &str, id: &str, updates: Updates)
        -> Result<(), EngineError>;

    /// Remove a document.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), EngineError>;
}
