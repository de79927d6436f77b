//! Configuration management for composebox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (`COMPOSEBOX__*`)
//! 4. Deployment variables (`BUCKET_NAME`, `FILE_NAME`, `HOST`,
//!    `GOOGLE_APPLICATION_CREDENTIALS`, `SIGNED_URL_EXPIRY`), highest priority
//!
//! # Usage
//!
//! ```no_run
//! use composebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `COMPOSEBOX__<section>__<key>`
//!
//! Examples:
//! - `COMPOSEBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `COMPOSEBOX__MERGE__MAX_COMPOSE_SOURCES=32`
//! - `COMPOSEBOX__SIGNING__DEFAULT_EXPIRY=30m`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/composebox.toml`.
//! This can be overridden using the `COMPOSEBOX_CONFIG` environment variable.
//!
//! Bucket and object names are optional here; endpoints that need them report their
//! absence per request.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    Config, MergeConfig, ServerConfig, SigningConfig, SigningMode, StorageConfig,
    StorageProvider,
};
pub use sources::apply_deployment_env;
pub use validation::{MAX_SIGNED_URL_EXPIRY, ValidationError};

use crate::compose::ComposerOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (compose limit, expiry bounds, missing credentials)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    ///
    /// Applies `.env`, `COMPOSEBOX__*` and the deployment variables exactly like
    /// [`Config::load`]; only the file location differs.
    pub fn load_with_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_with_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files. Deployment variables are not
    /// applied.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Composer tuning derived from the `[merge]` section
    pub fn composer_options(&self) -> ComposerOptions {
        ComposerOptions::builder()
            .max_sources(self.merge.max_compose_sources)
            .concurrency(self.merge.compose_concurrency)
            .ignore_final_compose_error(self.merge.ignore_final_compose_error)
            .build()
    }
}
