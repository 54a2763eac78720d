//! errors
//!
//! Public error taxonomy.
//!
//! Each layer owns a narrow error enum (`EngineError`, `RdfError`,
//! `TypeError`, `ConfigError`); [`SoukaiError`] aggregates them and adds
//! the model-level failures:
//!
//! - `DocumentAlreadyExists` / `DocumentNotFound` - engine id collisions and misses
//! - `InvalidModelAttributes` - attribute validation failures (carries the offending fields)
//! - `InvalidModelDefinition` - malformed schemas, detected at definition or boot time
//! - `Soukai` - programmer errors (double boot, malformed operation application, missing engine)
//!
//! Validation errors surface synchronously; engine errors are returned from
//! the async call that issued them. Nothing is retried.

use std::sync::PoisonError;

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::types::TypeError;
use crate::engine::EngineError;
use crate::rdf::RdfError;

/// Result alias used across the crate.
pub type Result<T, E = SoukaiError> = std::result::Result<T, E>;

/// Errors surfaced by models, relations and the registry.
#[derive(Debug, Error)]
pub enum SoukaiError {
    #[error("document '{id}' already exists in collection '{collection}'")]
    DocumentAlreadyExists { collection: String, id: String },

    #[error("document '{id}' not found in collection '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    #[error("invalid attributes for model {model}: {message}")]
    InvalidModelAttributes {
        model: String,
        message: String,
        /// Names of the offending attributes
        attributes: Vec<String>,
    },

    #[error("invalid definition for model {model}: {message}")]
    InvalidModelDefinition { model: String, message: String },

    #[error("{0}")]
    Soukai(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("rdf error: {0}")]
    Rdf(#[from] RdfError),

    #[error("type validation failed: {0}")]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SoukaiError {
    pub fn soukai(message: impl Into<String>) -> Self {
        SoukaiError::Soukai(message.into())
    }

    pub fn invalid_definition(model: impl Into<String>, message: impl Into<String>) -> Self {
        SoukaiError::InvalidModelDefinition {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn invalid_attributes(
        model: impl Into<String>,
        message: impl Into<String>,
        attributes: Vec<String>,
    ) -> Self {
        SoukaiError::InvalidModelAttributes {
            model: model.into(),
            message: message.into(),
            attributes,
        }
    }

    /// Whether this error is a missing-document error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SoukaiError::DocumentNotFound { .. })
    }
}

impl From<EngineError> for SoukaiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::DocumentAlreadyExists { collection, id } => {
                SoukaiError::DocumentAlreadyExists { collection, id }
            }
            EngineError::DocumentNotFound { collection, id } => {
                SoukaiError::DocumentNotFound { collection, id }
            }
            other => SoukaiError::Engine(other.to_string()),
        }
    }
}

impl<T> From<PoisonError<T>> for SoukaiError {
    fn from(error: PoisonError<T>) -> Self {
        SoukaiError::Soukai(format!("lock poisoned: {}", error))
    }
}
