//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-sensorhub-connection` or `--debug-all`.

use std::collections::HashMap;
use std::env;

use crate::{crate_target, KNOWN_CRATES};

/// Per-crate debug switches
///
/// # Example
/// ```rust
/// use sensorhub_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-sensorhub-session".to_string()]);
/// assert!(flags.is_enabled("sensorhub-session"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashMap<String, bool>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}`. `--debug-all`
    /// enables every known crate.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
                continue;
            }
            if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enabled_crates.insert(crate_name.to_string(), true);
            }
        }
        flags
    }

    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enabled_crates.insert(crate_name.to_string(), true);
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains_key(crate_name)
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` for enabled crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Build an `EnvFilter` directive string
    ///
    /// Format: `"sensorhub_session=debug,info"`, or just the base level when
    /// nothing is enabled.
    pub fn to_filter_string_with_base(&self, base_level: &str) -> String {
        let mut names: Vec<&String> = self.enabled_crates.keys().collect();
        names.sort();
        let mut filters: Vec<String> = names
            .into_iter()
            .map(|name| format!("{}=debug", crate_target(name)))
            .collect();
        filters.push(base_level.to_string());
        filters.join(",")
    }

    pub fn to_filter_string(&self) -> String {
        self.to_filter_string_with_base("info")
    }
}

/// Parse debug flags from process arguments and `SENSORHUB_DEBUG`
///
/// Environment variable format: comma-separated crate names, or `all`.
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var("SENSORHUB_DEBUG") {
        merge_env_flags(&mut flags, &env_var);
    }
    flags
}

fn merge_env_flags(flags: &mut CrateDebugFlags, env_var: &str) {
    if env_var == "all" {
        flags.enable_all();
        return;
    }
    for crate_name in env_var.split(',') {
        let crate_name = crate_name.trim();
        if !crate_name.is_empty() {
            flags.enabled_crates.insert(crate_name.to_string(), true);
        }
    }
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  SENSORHUB_DEBUG={{crate-name}}[,{{crate-name}}]
  SENSORHUB_DEBUG=all
"#,
        KNOWN_CRATES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-sensorhub-connection".to_string()]);
        assert!(flags.is_enabled("sensorhub-connection"));
        assert!(!flags.is_enabled("sensorhub-session"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_filter_string_uses_library_targets() {
        let flags = CrateDebugFlags::from_args(vec![
            "--debug-sensorhub-executor".to_string(),
            "--debug-sensorhub-timesync".to_string(),
        ]);
        assert_eq!(
            flags.to_filter_string(),
            "sensorhub_executor=debug,sensorhub_timesync=debug,info"
        );
    }

    #[test]
    fn test_empty_flags_filter_is_base_level() {
        let flags = CrateDebugFlags::default();
        assert_eq!(flags.to_filter_string_with_base("warn"), "warn");
        assert!(!flags.any_enabled());
    }

    #[test]
    fn test_env_value_merges() {
        let mut flags = CrateDebugFlags::default();
        merge_env_flags(&mut flags, "sensorhub-session, sensorhub-hal,");
        assert!(flags.is_enabled("sensorhub-session"));
        assert!(flags.is_enabled("sensorhub-hal"));
        assert_eq!(flags.enabled_crates.len(), 2);
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-sensorhub-session".to_string()]);
        assert_eq!(flags.log_level("sensorhub-session"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("sensorhub-hal"), tracing::Level::INFO);
    }
}
