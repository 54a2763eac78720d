//! rdf
//!
//! RDF representation of models.
//!
//! # Modules
//!
//! - [`vocab`] - Vocabulary IRIs and prefix expansion
//! - [`term`] - Terms, literals and quads
//! - [`turtle`] - Turtle writer and parser (oxrdfio)
//! - [`jsonld`] - Expanded JSON-LD documents (the stored form) and tombstones
//! - [`mapper`] - Model attributes to quads and back
//!
//! # Literal Encoding
//!
//! | Field type | RDF term |
//! |---|---|
//! | String | plain literal |
//! | Number | `xsd:integer` (whole numbers) or `xsd:decimal` |
//! | Boolean | `xsd:boolean` |
//! | Date | `xsd:dateTime`, UTC, `YYYY-MM-DDTHH:mm:ss.mmmZ` |
//! | Key | named node |
//! | Array | one statement per element |
//! | Object | blank node |

pub mod jsonld;
pub mod mapper;
pub mod term;
pub mod turtle;
pub mod vocab;

pub use mapper::{create_from_rdf, serialize_to_rdf};
pub use term::{Literal, Quad, Term};
pub use turtle::{parse_turtle, write_turtle};

use thiserror::Error;

/// Errors from RDF encoding and decoding.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RdfError {
    #[error("turtle syntax error: {0}")]
    Parse(String),

    #[error("cannot write turtle: {0}")]
    Write(String),

    #[error("invalid iri '{0}'")]
    InvalidIri(String),

    #[error("invalid json-ld document: {0}")]
    InvalidDocument(String),

    #[error("cannot read {value:?} as {expected}")]
    Cast { value: String, expected: String },
}
