// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, applied in order:
//! 1. TOML file (base values, missing keys fall back to defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)
//!
//! The merged result is validated before it is returned.

use crate::{validate_config, ConfigError, ConfigResult, HubConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "sensorhub.toml";

/// Find the sensorhub configuration file
///
/// Search order:
/// 1. `SENSORHUB_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("SENSORHUB_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by SENSORHUB_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet SENSORHUB_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns an error if the file is missing, is not valid TOML, or the merged
/// configuration fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<HubConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: HubConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    validate_config(&config)?;
    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `SENSORHUB_RESPONSE_TIMEOUT_MS` -> `connection.response_timeout_ms`
/// - `SENSORHUB_WATCHDOG_ENABLED` -> `connection.watchdog_enabled`
/// - `SENSORHUB_REALTIME_DELIVERY` -> `connection.realtime_delivery`
/// - `SENSORHUB_OFFSET_UPDATE_INTERVAL_MS` -> `timesync.offset_update_interval_ms`
/// - `SENSORHUB_REDISCOVERY_RETRIES` -> `session.rediscovery_retries`
/// - `SENSORHUB_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut HubConfig) {
    if let Ok(value) = env::var("SENSORHUB_RESPONSE_TIMEOUT_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.connection.response_timeout_ms = ms;
        }
    }
    if let Ok(value) = env::var("SENSORHUB_WATCHDOG_ENABLED") {
        config.connection.watchdog_enabled = parse_bool(&value);
    }
    if let Ok(value) = env::var("SENSORHUB_REALTIME_DELIVERY") {
        config.connection.realtime_delivery = parse_bool(&value);
    }
    if let Ok(value) = env::var("SENSORHUB_OFFSET_UPDATE_INTERVAL_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timesync.offset_update_interval_ms = ms;
        }
    }
    if let Ok(value) = env::var("SENSORHUB_REDISCOVERY_RETRIES") {
        if let Ok(retries) = value.parse::<u32>() {
            config.session.rediscovery_retries = retries;
        }
    }
    if let Ok(value) = env::var("SENSORHUB_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"response_timeout_ms": "500"}`)
pub fn apply_cli_overrides(config: &mut HubConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("response_timeout_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.connection.response_timeout_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("watchdog") {
        config.connection.watchdog_enabled = parse_bool(value);
    }
    if let Some(value) = cli_args.get("realtime") {
        config.connection.realtime_delivery = parse_bool(value);
    }
    if let Some(value) = cli_args.get("offset_update_interval_ms") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timesync.offset_update_interval_ms = ms;
        }
    }
    if let Some(value) = cli_args.get("stats") {
        config.session.stats_enabled = parse_bool(value);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        File::create(&config_path).unwrap();

        env::set_var("SENSORHUB_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("SENSORHUB_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("SENSORHUB_CONFIG_PATH", "/nonexistent/sensorhub.toml");
        let result = find_config_file();
        env::remove_var("SENSORHUB_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_partial_config_keeps_defaults() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = env::var("SENSORHUB_RESPONSE_TIMEOUT_MS").ok();
        env::remove_var("SENSORHUB_RESPONSE_TIMEOUT_MS");

        let dir = tempdir().unwrap();
        let config_path = dir.path().join("sensorhub.toml");
        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[connection]").unwrap();
        writeln!(file, "response_timeout_ms = 750").unwrap();
        writeln!(file, "[session]").unwrap();
        writeln!(file, "rediscovery_retries = 5").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.connection.response_timeout_ms, 750);
        assert_eq!(config.session.rediscovery_retries, 5);
        assert_eq!(config.connection.discovery_attempts, 4);
        assert_eq!(config.timesync.max_iterations, 10);

        if let Some(value) = saved {
            env::set_var("SENSORHUB_RESPONSE_TIMEOUT_MS", value);
        }
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("sensorhub.toml");
        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[connection").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = HubConfig::default();

        env::set_var("SENSORHUB_WATCHDOG_ENABLED", "yes");
        env::set_var("SENSORHUB_OFFSET_UPDATE_INTERVAL_MS", "5000");

        apply_environment_overrides(&mut config);

        env::remove_var("SENSORHUB_WATCHDOG_ENABLED");
        env::remove_var("SENSORHUB_OFFSET_UPDATE_INTERVAL_MS");

        assert!(config.connection.watchdog_enabled);
        assert_eq!(config.timesync.offset_update_interval_ms, 5000);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = HubConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("realtime".to_string(), "true".to_string());
        cli_args.insert("log_level".to_string(), "debug".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert!(config.connection.realtime_delivery);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("sensorhub.toml");

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[connection]").unwrap();
        writeln!(file, "response_timeout_ms = 1000").unwrap();
        writeln!(file, "[logging]").unwrap();
        writeln!(file, "level = \"warn\"").unwrap();

        env::set_var("SENSORHUB_RESPONSE_TIMEOUT_MS", "1500");
        env::set_var("SENSORHUB_LOG_LEVEL", "error");

        let mut cli_args = HashMap::new();
        cli_args.insert("log_level".to_string(), "trace".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("SENSORHUB_RESPONSE_TIMEOUT_MS");
        env::remove_var("SENSORHUB_LOG_LEVEL");

        // CLI wins for level, env wins for timeout (no CLI override)
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.connection.response_timeout_ms, 1500);
    }
}
