//! Configuration management for torrentbox
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use torrentbox::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Engine RPC endpoint: {}", config.rpc_url());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `TORRENTBOX__<section>__<key>`, e.g.
//! - `TORRENTBOX__SESSION__TIMEOUT_SECS=3600`
//! - `TORRENTBOX__ENGINE__MANAGE=false`
//! - `TORRENTBOX__POSTPROCESS__MIN_SUBTITLE_BYTES=1K`
//!
//! # Configuration File
//!
//! Loaded from `config/torrentbox.toml` unless `--config` or `TORRENTBOX_CONFIG` says otherwise.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, EngineConfig, PathsConfig, PostProcessConfig, RpcConfig, SessionConfig, SubmitConfig,
    TelemetryConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load(explicit_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::validated(sources::load(explicit_path)?)
    }

    fn validated(config: Config) -> Result<Self, ConfigError> {
        validation::validate(&config)?;
        Ok(config)
    }

    /// Effective configuration rendered back to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
