//! Store configuration.
//!
//! Configuration is read from an optional TOML file and overridden by
//! environment variables prefixed with `AUTHSTORE`, using `__` as the
//! nesting separator (e.g. `AUTHSTORE__PROJECTION_CACHE__MAX_CAPACITY=500`).
//!
//! # Example (TOML)
//!
//! ```toml
//! [projection_cache]
//! max_capacity = 10000
//! idle_timeout = "1m"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "AUTHSTORE";

/// Root store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Cache of parsed JSON columns.
    pub projection_cache: ProjectionCacheConfig,
}

/// Projection cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectionCacheConfig {
    /// Maximum number of cached projections per attribute kind.
    pub max_capacity: u64,

    /// Sliding expiration of a cached projection.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for ProjectionCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl StoreConfig {
    /// Creates the process-wide projection cache with these settings.
    ///
    /// Call once at startup, before the first store is resolved; returns
    /// `false` if the cache already exists.
    pub fn apply(&self) -> bool {
        crate::projection::init_global(&self.projection_cache)
    }

    /// Loads the configuration from an optional file plus environment overrides.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be parsed and
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let path = PathBuf::from(path);
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .try_parsing(true)
                .separator("__"),
        );

        let merged: StoreConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the cache capacity or idle
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.projection_cache.max_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "projection_cache.max_capacity must be > 0".to_string(),
            ));
        }
        if self.projection_cache.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "projection_cache.idle_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
