//! engine
//!
//! Storage boundary.
//!
//! # Modules
//!
//! - [`traits`] - The `Engine` trait models and relations call into
//! - [`memory`] - In-memory engine with an operation log
//! - [`cache`] - Document cache with tombstones, and the caching engine
//! - [`scope`] - Per-class engine slots with reference-counted overrides

pub mod cache;
pub mod memory;
pub mod scope;
pub mod traits;

pub use cache::{CachedEngine, DocumentsCache};
pub use memory::InMemoryEngine;
pub use scope::{EngineScope, EngineSlot};
pub use traits::{Document, Documents, Engine, EngineError, FieldFilter, Filters, Updates};
