//! history
//!
//! Field-level change tracking for RDF models.
//!
//! # Model
//!
//! Every change to a tracked model is recorded as an immutable, dated
//! [`Operation`]. Replaying the operations of a resource in date order
//! rebuilds its attributes; merging the operation streams of two replicas
//! and replaying the union makes them converge.
//!
//! # Modules
//!
//! - [`operations`] - Operation values and their replay order
//! - [`replay`] - Replay, merge and diff
//! - [`rdf`] - Operations and metadata as RDF resources

pub mod operations;
pub mod rdf;
pub mod replay;

pub use operations::{Operation, OperationKind};
pub use rdf::{read_metadata, read_operations, Metadata};
pub use replay::{
    apply_operation, diff_operations, initial_operations, merge_operations, replay, Replayed,
};
