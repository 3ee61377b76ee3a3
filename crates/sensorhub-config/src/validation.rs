//! Configuration validation
//!
//! Rejects values that would make retry loops unbounded, timeouts
//! degenerate, or the clock translator unable to converge.

use crate::{ConfigError, ConfigResult, HubConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MustBePositive { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MustBePositive { field } => {
                write!(f, "{} must be greater than zero", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every failed check
pub fn validate_config(config: &HubConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_connection(config, &mut errors);
    validate_timesync(config, &mut errors);
    validate_session(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn require_positive(value: u64, field: &str, errors: &mut Vec<ConfigValidationError>) {
    if value == 0 {
        errors.push(ConfigValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
}

fn validate_connection(config: &HubConfig, errors: &mut Vec<ConfigValidationError>) {
    let c = &config.connection;
    require_positive(c.discovery_attempts as u64, "connection.discovery_attempts", errors);
    require_positive(
        c.discovery_attempts_after_access as u64,
        "connection.discovery_attempts_after_access",
        errors,
    );
    require_positive(c.discovery_timeout_ms, "connection.discovery_timeout_ms", errors);
    require_positive(
        c.discovery_timeout_after_access_ms,
        "connection.discovery_timeout_after_access_ms",
        errors,
    );
    require_positive(c.response_timeout_ms, "connection.response_timeout_ms", errors);
    require_positive(c.max_request_len as u64, "connection.max_request_len", errors);
    require_positive(c.send_retry_attempts as u64, "connection.send_retry_attempts", errors);

    if c.discovery_attempts_after_access > c.discovery_attempts {
        errors.push(ConfigValidationError::InvalidValue {
            field: "connection.discovery_attempts_after_access".to_string(),
            reason: "must not exceed connection.discovery_attempts".to_string(),
        });
    }
}

fn validate_timesync(config: &HubConfig, errors: &mut Vec<ConfigValidationError>) {
    let t = &config.timesync;
    require_positive(t.counter_frequency_hz, "timesync.counter_frequency_hz", errors);
    require_positive(t.offset_update_interval_ms, "timesync.offset_update_interval_ms", errors);
    require_positive(t.jitter_threshold_ns, "timesync.jitter_threshold_ns", errors);
    require_positive(t.max_iterations as u64, "timesync.max_iterations", errors);
}

fn validate_session(config: &HubConfig, errors: &mut Vec<ConfigValidationError>) {
    let s = &config.session;
    require_positive(s.rediscovery_retries as u64, "session.rediscovery_retries", errors);
    require_positive(s.fifo_max_event_count as u64, "session.fifo_max_event_count", errors);
    require_positive(s.bias_list_capacity as u64, "session.bias_list_capacity", errors);
}

fn validate_logging(config: &HubConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HubConfig::default();
        let result = validate_config(&config);
        if let Err(e) = &result {
            eprintln!("Validation error: {}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_response_timeout_rejected() {
        let mut config = HubConfig::default();
        config.connection.response_timeout_ms = 0;

        let result = validate_config(&config);
        match result {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("connection.response_timeout_ms"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_post_access_budget_cannot_exceed_initial() {
        let mut config = HubConfig::default();
        config.connection.discovery_attempts = 2;
        config.connection.discovery_attempts_after_access = 3;

        let result = validate_config(&config);
        match result {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("discovery_attempts_after_access"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_all_failures_reported_together() {
        let mut config = HubConfig::default();
        config.timesync.jitter_threshold_ns = 0;
        config.logging.level = "verbose".to_string();

        let result = validate_config(&config);
        match result {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("timesync.jitter_threshold_ns"));
                assert!(msg.contains("logging.level"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
