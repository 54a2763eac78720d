//! core::config
//!
//! Configuration loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. The first configuration file found
//!
//! # Locations
//!
//! Searched in order:
//! 1. `$SOUKAI_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/soukai/config.toml`
//! 3. `~/.soukai/config.toml`
//!
//! Missing files are not an error; defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use soukai::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("Resource hash: {}", config.default_resource_hash());
//! println!("Timestamps: {}", config.timestamps());
//! ```

pub mod schema;

pub use schema::{CacheConfig, ConfigFile, ModelDefaults, RdfConfig};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at a configuration file.
pub const CONFIG_ENV: &str = "SOUKAI_CONFIG";

/// Default fragment for minted resource urls.
pub const DEFAULT_RESOURCE_HASH: &str = "it";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration with defaults applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: ConfigFile,
    /// Path the file was loaded from (if any)
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read,
    /// parsed or validated.
    pub fn load() -> Result<Config, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        debug!(path = %path.display(), "loaded configuration");

        Ok(Config {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Config, ConfigError> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Config { file, path: None })
    }

    fn find_config_file() -> Option<PathBuf> {
        // 1. Check $SOUKAI_CONFIG
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/soukai/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("soukai/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.soukai/config.toml
        dirs::home_dir()
            .map(|home| home.join(".soukai/config.toml"))
            .filter(|path| path.exists())
    }

    /// Path the configuration was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether new schemas get timestamp fields (default: true).
    pub fn timestamps(&self) -> bool {
        self.file
            .models
            .as_ref()
            .and_then(|m| m.timestamps)
            .unwrap_or(true)
    }

    /// Fragment used for minted resource urls (default: "it").
    pub fn default_resource_hash(&self) -> &str {
        self.file
            .models
            .as_ref()
            .and_then(|m| m.default_resource_hash.as_deref())
            .unwrap_or(DEFAULT_RESOURCE_HASH)
    }

    /// Whether RDF models track history by default (default: false).
    pub fn history(&self) -> bool {
        self.file
            .models
            .as_ref()
            .and_then(|m| m.history)
            .unwrap_or(false)
    }

    /// Whether the document cache is enabled (default: true).
    pub fn cache_enabled(&self) -> bool {
        self.file
            .cache
            .as_ref()
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    /// Extra prefixes for the Turtle writer.
    pub fn prefixes(&self) -> BTreeMap<String, String> {
        self.file
            .rdf
            .as_ref()
            .map(|rdf| rdf.prefixes.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.timestamps());
        assert!(!config.history());
        assert!(config.cache_enabled());
        assert_eq!(config.default_resource_hash(), "it");
        assert!(config.prefixes().is_empty());
        assert!(config.path().is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[models]\ntimestamps = false\ndefault_resource_hash = \"me\"\nhistory = true"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(!config.timestamps());
        assert!(config.history());
        assert_eq!(config.default_resource_hash(), "me");
        assert_eq!(config.path(), Some(file.path()));
    }

    #[test]
    fn load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn parse_errors_carry_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[models\n").unwrap();

        match Config::load_from(file.path()) {
            Err(ConfigError::ParseError { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn from_toml_validates() {
        let result = Config::from_toml("[models]\ndefault_resource_hash = \"\"");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
