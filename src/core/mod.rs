//! core
//!
//! Core value types shared by every layer.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Url, date formatting
//! - [`value`] - Typed attribute values
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid identifiers at construction time
//! - Dates always carry millisecond precision in UTC
//! - JSON is the interchange format with engines; schemas restore types

pub mod config;
pub mod types;
pub mod value;
