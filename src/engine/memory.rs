//! engine::memory
//!
//! In-memory engine for tests and embedding.
//!
//! # Design
//!
//! Documents live in a map of collections behind `Arc<Mutex<...>>`, so
//! clones share state. Every call is recorded and a single operation can
//! be configured to fail, which lets tests assert which engine calls a
//! model or relation issued (and exercise error paths).
//!
//! # Example
//!
//! ```
//! use soukai::engine::{Engine, EngineError, InMemoryEngine};
//! use soukai::engine::memory::{EngineOperation, FailOn};
//!
//! # tokio_test::block_on(async {
//! let engine = InMemoryEngine::new()
//!     .fail_on(FailOn::ReadMany(EngineError::Backend("offline".into())));
//!
//! assert!(engine.read_many("people", None).await.is_err());
//! assert!(matches!(engine.operations()[0], EngineOperation::ReadMany { .. }));
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::trace;

use super::traits::{Document, Documents, Engine, EngineError, Filters, Updates};

/// Engine storing documents in memory.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    inner: Arc<Mutex<InMemoryEngineInner>>,
}

#[derive(Debug, Default)]
struct InMemoryEngineInner {
    /// Documents by collection, then id.
    collections: BTreeMap<String, Documents>,
    /// Operation to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<EngineOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    Create(EngineError),
    ReadOne(EngineError),
    ReadMany(EngineError),
    Update(EngineError),
    Delete(EngineError),
}

/// Recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOperation {
    Create {
        collection: String,
        id: Option<String>,
    },
    ReadOne {
        collection: String,
        id: String,
    },
    ReadMany {
        collection: String,
        filters: Option<Filters>,
    },
    Update {
        collection: String,
        id: String,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl EngineOperation {
    /// Collection the operation targeted.
    pub fn collection(&self) -> &str {
        match self {
            EngineOperation::Create { collection, .. }
            | EngineOperation::ReadOne { collection, .. }
            | EngineOperation::ReadMany { collection, .. }
            | EngineOperation::Update { collection, .. }
            | EngineOperation::Delete { collection, .. } => collection,
        }
    }
}

impl InMemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with pre-existing documents.
    pub fn with_documents(collections: BTreeMap<String, Documents>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryEngineInner {
                collections,
                ..Default::default()
            })),
        }
    }

    /// Configure the engine to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.state().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.state().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<EngineOperation> {
        self.state().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Get a document without recording an operation.
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    /// Ids stored in a collection, without recording an operation.
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.state()
            .collections
            .get(collection)
            .map(|documents| documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored documents across every collection.
    pub fn document_count(&self) -> usize {
        self.state().collections.values().map(BTreeMap::len).sum()
    }

    /// Lock the state for inspection.
    ///
    /// Poisoning is ignored: the state is plain data and every mutation
    /// completes before the lock is released.
    fn state(&self) -> MutexGuard<'_, InMemoryEngineInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an operation and return the configured failure, if any.
    fn begin(&self, operation: EngineOperation) -> Result<MutexGuard<'_, InMemoryEngineInner>, EngineError> {
        trace!(?operation, "in-memory engine call");

        let mut inner = self.state();
        let failure = match (&inner.fail_on, &operation) {
            (Some(FailOn::Create(e)), EngineOperation::Create { .. })
            | (Some(FailOn::ReadOne(e)), EngineOperation::ReadOne { .. })
            | (Some(FailOn::ReadMany(e)), EngineOperation::ReadMany { .. })
            | (Some(FailOn::Update(e)), EngineOperation::Update { .. })
            | (Some(FailOn::Delete(e)), EngineOperation::Delete { .. }) => Some(e.clone()),
            _ => None,
        };
        inner.operations.push(operation);

        match failure {
            Some(error) => Err(error),
            None => Ok(inner),
        }
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        collection: &str,
        document: Document,
        id: Option<&str>,
    ) -> Result<String, EngineError> {
        let mut inner = self.begin(EngineOperation::Create {
            collection: collection.to_string(),
            id: id.map(str::to_string),
        })?;

        let documents = inner.collections.entry(collection.to_string()).or_default();
        let id = match id {
            Some(id) if documents.contains_key(id) => {
                return Err(EngineError::already_exists(collection, id));
            }
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        documents.insert(id.clone(), document);
        Ok(id)
    }

    async fn read_one(&self, collection: &str, id: &str) -> Result<Document, EngineError> {
        let inner = self.begin(EngineOperation::ReadOne {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        inner
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
            .ok_or_else(|| EngineError::not_found(collection, id))
    }

    async fn read_many(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<Documents, EngineError> {
        let inner = self.begin(EngineOperation::ReadMany {
            collection: collection.to_string(),
            filters: filters.cloned(),
        })?;

        let Some(documents) = inner.collections.get(collection) else {
            return Ok(Documents::new());
        };

        Ok(documents
            .iter()
            .filter(|(id, document)| filters.map_or(true, |f| f.matches(id, document)))
            .map(|(id, document)| (id.clone(), document.clone()))
            .collect())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Updates,
    ) -> Result<(), EngineError> {
        let mut inner = self.begin(EngineOperation::Update {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        let document = inner
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| EngineError::not_found(collection, id))?;

        updates.apply(document);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), EngineError> {
        let mut inner = self.begin(EngineOperation::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        inner
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(collection, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_and_read() {
        let engine = InMemoryEngine::new();
        let id = engine
            .create("people", document(json!({"name": "Alice"})), Some("1"))
            .await
            .unwrap();

        assert_eq!(id, "1");
        let read = engine.read_one("people", "1").await.unwrap();
        assert_eq!(read["name"], "Alice");
    }

    #[tokio::test]
    async fn create_mints_ids() {
        let engine = InMemoryEngine::new();
        let a = engine.create("people", Document::new(), None).await.unwrap();
        let b = engine.create("people", Document::new(), None).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(engine.ids("people").len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let engine = InMemoryEngine::new();
        engine.create("people", Document::new(), Some("1")).await.unwrap();

        let result = engine.create("people", Document::new(), Some("1")).await;
        assert!(matches!(result, Err(EngineError::DocumentAlreadyExists { .. })));
    }

    #[tokio::test]
    async fn missing_documents() {
        let engine = InMemoryEngine::new();

        assert!(matches!(
            engine.read_one("people", "1").await,
            Err(EngineError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            engine.update("people", "1", Updates::default()).await,
            Err(EngineError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            engine.delete("people", "1").await,
            Err(EngineError::DocumentNotFound { .. })
        ));
        assert!(engine.read_many("people", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_many_filters() {
        let engine = InMemoryEngine::new();
        engine
            .create("posts", document(json!({"authorId": "1"})), Some("a"))
            .await
            .unwrap();
        engine
            .create("posts", document(json!({"authorId": "2"})), Some("b"))
            .await
            .unwrap();

        let filters = Filters::default().with_field(
            "authorId",
            crate::engine::FieldFilter::Equals(json!("2")),
        );
        let documents = engine.read_many("posts", Some(&filters)).await.unwrap();
        assert_eq!(documents.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let engine = InMemoryEngine::new();
        engine
            .create("people", document(json!({"name": "Alice", "age": 30})), Some("1"))
            .await
            .unwrap();

        let mut updates = Updates::default();
        updates.set.insert("name".into(), json!("Alicia"));
        updates.unset.push("age".into());
        engine.update("people", "1", updates).await.unwrap();

        assert_eq!(
            engine.document("people", "1"),
            Some(document(json!({"name": "Alicia"})))
        );

        engine.delete("people", "1").await.unwrap();
        assert_eq!(engine.document_count(), 0);
    }

    mod failures {
        use super::*;

        #[tokio::test]
        async fn configured_failure() {
            let engine = InMemoryEngine::new()
                .fail_on(FailOn::Create(EngineError::Backend("disk full".into())));

            let result = engine.create("people", Document::new(), None).await;
            assert_eq!(result, Err(EngineError::Backend("disk full".into())));
            assert_eq!(engine.document_count(), 0);

            engine.clear_fail_on();
            assert!(engine.create("people", Document::new(), None).await.is_ok());
        }

        #[tokio::test]
        async fn failure_only_affects_its_operation() {
            let engine = InMemoryEngine::new()
                .fail_on(FailOn::Delete(EngineError::Backend("nope".into())));

            assert!(engine.read_many("people", None).await.is_ok());
        }
    }

    mod operations {
        use super::*;

        #[tokio::test]
        async fn records_calls() {
            let engine = InMemoryEngine::new();
            engine.create("people", Document::new(), Some("1")).await.unwrap();
            let _ = engine.read_one("people", "1").await;

            assert_eq!(
                engine.operations(),
                vec![
                    EngineOperation::Create {
                        collection: "people".into(),
                        id: Some("1".into()),
                    },
                    EngineOperation::ReadOne {
                        collection: "people".into(),
                        id: "1".into(),
                    },
                ]
            );

            engine.clear_operations();
            assert!(engine.operations().is_empty());
        }

        #[tokio::test]
        async fn clones_share_state() {
            let engine = InMemoryEngine::new();
            let clone = engine.clone();
            clone.create("people", Document::new(), Some("1")).await.unwrap();

            assert!(engine.document("people", "1").is_some());
            assert_eq!(engine.operations()[0].collection(), "people");
        }
    }
}
