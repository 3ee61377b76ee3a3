// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub configuration
//!
//! Type-safe configuration for the sensor-hub client runtime:
//! - TOML file parsing (`sensorhub.toml`)
//! - Environment variable overrides (`SENSORHUB_*`)
//! - CLI argument overrides
//! - Validation of timing and retry budgets
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sensorhub_config::load_config;
//!
//! let config = load_config(None, None).expect("Failed to load config");
//! println!("response timeout: {} ms", config.connection.response_timeout_ms);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = HubConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: HubConfig = toml::from_str(&text).unwrap();
        assert_eq!(
            parsed.connection.response_timeout_ms,
            config.connection.response_timeout_ms
        );
        assert_eq!(parsed.session.rediscovery_retries, config.session.rediscovery_retries);
    }
}
