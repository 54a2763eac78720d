//! schema
//!
//! Field and model schemas.
//!
//! - [`field`] - field types, casting and codecs
//! - [`definition`] - model schemas and definition-time validation
//! - [`declaration`] - schemas declared as JSON or TOML

pub mod declaration;
pub mod definition;
pub mod field;

pub use declaration::SchemaDeclaration;
pub use definition::{define_schema, ModelSchema, RdfSchema, SchemaBuilder, Timestamps};
pub use field::{CastError, FieldCodec, FieldDefinition, FieldType};
