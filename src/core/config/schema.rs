//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Location
//!
//! Searched in order of precedence:
//! 1. `$SOUKAI_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/soukai/config.toml`
//! 3. `~/.soukai/config.toml`
//!
//! # Validation
//!
//! Values are validated after parsing (e.g. prefixes must map to
//! absolute IRIs).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::Url;

/// Contents of a configuration file.
///
/// # Example
///
/// ```toml
/// [models]
/// timestamps = true
/// default_resource_hash = "it"
/// history = false
///
/// [cache]
/// enabled = true
///
/// [rdf.prefixes]
/// foaf = "http://xmlns.com/foaf/0.1/"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Defaults applied to new model schemas
    pub models: Option<ModelDefaults>,

    /// Document cache settings
    pub cache: Option<CacheConfig>,

    /// RDF serialization settings
    pub rdf: Option<RdfConfig>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(models) = &self.models {
            models.validate()?;
        }

        if let Some(rdf) = &self.rdf {
            rdf.validate()?;
        }

        Ok(())
    }
}

/// Model schema defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelDefaults {
    /// Whether new schemas get `createdAt`/`updatedAt` fields
    pub timestamps: Option<bool>,

    /// Fragment used when minting resource urls (default: "it")
    pub default_resource_hash: Option<String>,

    /// Whether RDF models track CRDT history by default
    pub history: Option<bool>,
}

impl ModelDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(hash) = &self.default_resource_hash {
            if hash.is_empty() || hash.contains(['#', '/', ' ']) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid default_resource_hash '{}'",
                    hash
                )));
            }
        }

        Ok(())
    }
}

/// Document cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether engines built from this config are wrapped in a cache
    pub enabled: Option<bool>,
}

/// RDF settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RdfConfig {
    /// Extra prefixes used by the Turtle writer
    pub prefixes: BTreeMap<String, String>,
}

impl RdfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (prefix, iri) in &self.prefixes {
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid prefix name '{}'",
                    prefix
                )));
            }

            Url::new(iri.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid iri for prefix '{}': {}", prefix, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(file, ConfigFile::default());
        assert!(file.validate().is_ok());
    }

    #[test]
    fn full_file_parses() {
        let file: ConfigFile = toml::from_str(
            r#"
            [models]
            timestamps = false
            default_resource_hash = "me"
            history = true

            [cache]
            enabled = false

            [rdf.prefixes]
            foaf = "http://xmlns.com/foaf/0.1/"
            "#,
        )
        .unwrap();

        assert!(file.validate().is_ok());
        let models = file.models.unwrap();
        assert_eq!(models.timestamps, Some(false));
        assert_eq!(models.default_resource_hash.as_deref(), Some("me"));
        assert_eq!(file.cache.unwrap().enabled, Some(false));
        assert_eq!(
            file.rdf.unwrap().prefixes.get("foaf").map(String::as_str),
            Some("http://xmlns.com/foaf/0.1/")
        );
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("unknown = 1");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_hash_rejected() {
        let defaults = ModelDefaults {
            default_resource_hash: Some("a#b".into()),
            ..Default::default()
        };
        assert!(defaults.validate().is_err());
    }

    #[test]
    fn relative_prefix_iri_rejected() {
        let mut rdf = RdfConfig::default();
        rdf.prefixes.insert("ex".into(), "relative/path".into());
        assert!(rdf.validate().is_err());
    }
}
