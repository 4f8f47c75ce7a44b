//! Configuration types for the naming node.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::path::Path;

use crate::error::{NamingError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "naming.toml";

/// Naming node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Instance legality limits.
    pub validation: ValidationConfig,
    /// Log output configuration.
    pub logging: LoggingConfig,
}

impl NamingConfig {
    /// Loads configuration from `naming.toml` in the working directory.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads configuration from the specified file path.
    ///
    /// Environment variables prefixed with `NAMING_` override file settings,
    /// with `__` separating nested keys (`NAMING_VALIDATION__MAX_WEIGHT`).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(NamingError::ConfigFileNotFound(path.display().to_string()));
        }

        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("NAMING_").split("__"))
            .extract()
            .map_err(NamingError::from)
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(content))
            .extract()
            .map_err(NamingError::from)
    }
}

/// Instance legality limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Lowest accepted instance weight.
    pub min_weight: f64,
    /// Highest accepted instance weight.
    pub max_weight: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.0,
            max_weight: 10_000.0,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lodestar_naming=info".to_owned(),
        }
    }
}
