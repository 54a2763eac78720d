//! engine::cache
//!
//! Document cache and the caching engine wrapper.
//!
//! # Design
//!
//! [`DocumentsCache`] holds document snapshots keyed by `(collection, id)`
//! together with their last-modified time. An entry only answers reads
//! while it is *active*; [`DocumentsCache::activate`] re-validates an
//! entry against a known modification time and deactivates it when the
//! snapshot is older, so the next read goes to the engine.
//!
//! Deleted documents leave tombstone metadata behind. Reading a
//! tombstoned entry yields a synthesized tombstone document (see
//! [`crate::rdf::jsonld::tombstone_document`]), which lets callers tell
//! "deleted" apart from "never existed" without another engine call.
//!
//! Tombstones are knowledge only the cache has: the wrapped engine forgets
//! deleted documents entirely. [`DocumentsCache::clear`] therefore drops
//! document snapshots and keeps tombstones, so clearing never changes what
//! a read returns, just where it comes from.
//!
//! # Invalidation
//!
//! Every invalidation bumps an epoch. Reads capture the epoch before going
//! to the engine and only cache their result if no invalidation happened
//! meanwhile, so a read racing an update never re-caches the old document.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use soukai::engine::{CachedEngine, Engine, InMemoryEngine};
//!
//! # tokio_test::block_on(async {
//! let memory = InMemoryEngine::new();
//! let engine = CachedEngine::new(Arc::new(memory.clone()));
//!
//! engine.create("people", Default::default(), Some("1")).await.unwrap();
//! engine.read_one("people", "1").await.unwrap();
//!
//! // Served from the cache: only the create reached the engine.
//! assert_eq!(memory.operations().len(), 1);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::traits::{Document, Documents, Engine, EngineError, Filters, Updates};
use crate::core::types::{now, Url};
use crate::rdf::jsonld;

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheContent {
    /// A live document snapshot
    Document(Document),
    /// The document was deleted
    Tombstone {
        resource_url: String,
        deleted_at: DateTime<Utc>,
    },
}

/// A cached document and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub content: CacheContent,
    pub modified_at: DateTime<Utc>,
    pub active: bool,
}

type CacheKey = (String, String);

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    epoch: u64,
}

/// Document snapshots keyed by `(collection, id)`.
#[derive(Debug, Default)]
pub struct DocumentsCache {
    state: Mutex<CacheState>,
}

impl DocumentsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(collection: &str, id: &str) -> CacheKey {
        (collection.to_string(), id.to_string())
    }

    /// The cached document, if the entry is active.
    ///
    /// Tombstone entries yield a synthesized tombstone document.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        let state = self.state();
        let entry = state.entries.get(&Self::key(collection, id))?;
        if !entry.active {
            return None;
        }

        match &entry.content {
            CacheContent::Document(document) => Some(document.clone()),
            CacheContent::Tombstone {
                resource_url,
                deleted_at,
            } => Some(jsonld::tombstone_document(resource_url, deleted_at)),
        }
    }

    /// The full entry, active or not.
    pub fn entry(&self, collection: &str, id: &str) -> Option<CacheEntry> {
        self.state().entries.get(&Self::key(collection, id)).cloned()
    }

    /// Invalidation counter, bumped by every forget, tombstone and clear.
    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Store a document snapshot as the active entry.
    pub fn remember(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        modified_at: DateTime<Utc>,
    ) {
        self.state().entries.insert(
            Self::key(collection, id),
            CacheEntry {
                content: CacheContent::Document(document),
                modified_at,
                active: true,
            },
        );
    }

    /// Store a snapshot read while the cache was at `epoch`.
    ///
    /// Returns `false`, storing nothing, when an invalidation happened
    /// since.
    pub fn remember_at(
        &self,
        epoch: u64,
        collection: &str,
        id: &str,
        document: Document,
        modified_at: DateTime<Utc>,
    ) -> bool {
        let mut state = self.state();
        if state.epoch != epoch {
            return false;
        }
        state.entries.insert(
            Self::key(collection, id),
            CacheEntry {
                content: CacheContent::Document(document),
                modified_at,
                active: true,
            },
        );
        true
    }

    /// Record that a document was deleted.
    pub fn remember_tombstone(
        &self,
        collection: &str,
        id: &str,
        resource_url: &str,
        deleted_at: DateTime<Utc>,
    ) {
        let mut state = self.state();
        state.epoch += 1;
        state.entries.insert(
            Self::key(collection, id),
            CacheEntry {
                content: CacheContent::Tombstone {
                    resource_url: resource_url.to_string(),
                    deleted_at,
                },
                modified_at: deleted_at,
                active: true,
            },
        );
    }

    /// Drop an entry.
    pub fn forget(&self, collection: &str, id: &str) {
        let mut state = self.state();
        state.epoch += 1;
        state.entries.remove(&Self::key(collection, id));
    }

    /// Validate an entry against a known modification time.
    ///
    /// The entry becomes active when its snapshot is at least as recent
    /// as `modified_at`, and inactive otherwise. Returns whether the entry
    /// is active afterwards (`false` when there is no entry).
    pub fn activate(&self, collection: &str, id: &str, modified_at: &DateTime<Utc>) -> bool {
        let mut state = self.state();
        let Some(entry) = state.entries.get_mut(&Self::key(collection, id)) else {
            return false;
        };

        entry.active = entry.modified_at >= *modified_at;
        entry.active
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Drop every document snapshot. Tombstones stay.
    pub fn clear(&self) {
        let mut state = self.state();
        state.epoch += 1;
        state
            .entries
            .retain(|_, entry| matches!(entry.content, CacheContent::Tombstone { .. }));
    }
}

/// Engine wrapper that answers reads from a [`DocumentsCache`].
///
/// - `read_one` is served from active entries, otherwise read through
/// - `read_many` always reaches the engine and refreshes the cache
/// - `update` invalidates the entry once the engine has applied it
/// - `delete` leaves a tombstone for the resource the document described
#[derive(Debug, Clone)]
pub struct CachedEngine {
    engine: Arc<dyn Engine>,
    cache: Arc<DocumentsCache>,
}

impl CachedEngine {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_cache(engine, Arc::new(DocumentsCache::new()))
    }

    pub fn with_cache(engine: Arc<dyn Engine>, cache: Arc<DocumentsCache>) -> Self {
        Self { engine, cache }
    }

    pub fn cache(&self) -> &Arc<DocumentsCache> {
        &self.cache
    }

    pub fn inner(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// See [`DocumentsCache::activate`].
    pub fn activate(&self, collection: &str, id: &str, modified_at: &DateTime<Utc>) -> bool {
        let active = self.cache.activate(collection, id, modified_at);
        if !active {
            debug!(collection, id, "cache entry stale, bypassing");
        }
        active
    }

    fn remember(&self, epoch: u64, collection: &str, id: &str, document: &Document) {
        let modified_at = jsonld::modified_at(document).unwrap_or_else(now);
        if !self
            .cache
            .remember_at(epoch, collection, id, document.clone(), modified_at)
        {
            trace!(collection, id, "invalidated while reading, not caching");
        }
    }

    /// The resource a document describes: the first subject of a cached
    /// JSON-LD snapshot, else the document's url within its container,
    /// else the id itself.
    fn resource_url(&self, collection: &str, id: &str) -> String {
        let described = self
            .cache
            .entry(collection, id)
            .and_then(|entry| match entry.content {
                CacheContent::Document(document) => jsonld::document_to_quads(&document)
                    .ok()?
                    .into_iter()
                    .find_map(|quad| quad.subject.as_iri().map(str::to_string)),
                CacheContent::Tombstone { resource_url, .. } => Some(resource_url),
            });

        described
            .or_else(|| {
                Url::new(collection)
                    .and_then(|container| container.join(id))
                    .ok()
                    .map(String::from)
            })
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl Engine for CachedEngine {
    fn name(&self) -> &'static str {
        "cached"
    }

    async fn create(
        &self,
        collection: &str,
        document: Document,
        id: Option<&str>,
    ) -> Result<String, EngineError> {
        let epoch = self.cache.epoch();
        let id = self.engine.create(collection, document.clone(), id).await?;
        self.remember(epoch, collection, &id, &document);
        Ok(id)
    }

    async fn read_one(&self, collection: &str, id: &str) -> Result<Document, EngineError> {
        if let Some(document) = self.cache.get(collection, id) {
            trace!(collection, id, "cache hit");
            return Ok(document);
        }

        trace!(collection, id, "cache miss");
        let epoch = self.cache.epoch();
        let document = self.engine.read_one(collection, id).await?;
        self.remember(epoch, collection, id, &document);
        Ok(document)
    }

    async fn read_many(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<Documents, EngineError> {
        let epoch = self.cache.epoch();
        let documents = self.engine.read_many(collection, filters).await?;
        for (id, document) in &documents {
            self.remember(epoch, collection, id, document);
        }
        Ok(documents)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Updates,
    ) -> Result<(), EngineError> {
        self.cache.forget(collection, id);
        let result = self.engine.update(collection, id, updates).await;
        self.cache.forget(collection, id);
        result
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), EngineError> {
        let resource_url = self.resource_url(collection, id);
        self.engine.delete(collection, id).await?;
        self.cache
            .remember_tombstone(collection, id, &resource_url, now());
        Ok(())
    }
}
