// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section of `sensorhub.toml`. Every field has a
//! default, so a partial file (or no file at all) yields a usable config.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    pub connection: ConnectionConfig,
    pub timesync: TimeSyncConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Channel to the coprocessor's client-manager service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Discovery attempts before the service has ever been reached
    pub discovery_attempts: u32,
    /// Discovery attempts once the service has answered at least once
    pub discovery_attempts_after_access: u32,
    pub discovery_timeout_ms: u64,
    pub discovery_timeout_after_access_ms: u64,
    /// Upper bound for a synchronous request
    pub response_timeout_ms: u64,
    /// Transport frame limit for a single request payload
    pub max_request_len: usize,
    /// Transport-level attempts per request before `SendFailed`
    pub send_retry_attempts: u32,
    pub send_retry_backoff_ms: u64,
    /// Consecutive failed sends (across all connections) before a restart is requested
    pub error_restart_threshold: u32,
    pub restart_on_send_failure: bool,
    pub watchdog_enabled: bool,
    /// Added to `response_timeout_ms` to form the watchdog deadline
    pub watchdog_extra_wait_ms: u64,
    /// Deliver indications on the transport thread instead of the executor
    pub realtime_delivery: bool,
    /// Log indication gaps longer than this (0 disables)
    pub indication_jitter_log_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            discovery_attempts: 4,
            discovery_attempts_after_access: 2,
            discovery_timeout_ms: 2000,
            discovery_timeout_after_access_ms: 500,
            response_timeout_ms: 2000,
            max_request_len: 1000,
            send_retry_attempts: 3,
            send_retry_backoff_ms: 10,
            error_restart_threshold: 10,
            restart_on_send_failure: false,
            watchdog_enabled: false,
            watchdog_extra_wait_ms: 10_000,
            realtime_delivery: false,
            indication_jitter_log_ms: 0,
        }
    }
}

impl ConnectionConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Deadline after which an outstanding request is considered wedged
    pub fn watchdog_deadline(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms + self.watchdog_extra_wait_ms)
    }
}

/// Clock domain translation between the coprocessor counter and host time
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeSyncConfig {
    /// Nominal frequency used by the portable fallback counter
    pub counter_frequency_hz: u64,
    /// Offset is considered stale after this long
    pub offset_update_interval_ms: u64,
    /// Two counter reads closer than this bound a host clock sample
    pub jitter_threshold_ns: u64,
    pub max_iterations: u32,
    /// Run a background thread forcing periodic offset refreshes
    pub updater_enabled: bool,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            counter_frequency_hz: 19_200_000,
            offset_update_interval_ms: 60_000,
            jitter_threshold_ns: 2_000,
            max_iterations: 10,
            updater_enabled: true,
        }
    }
}

impl TimeSyncConfig {
    pub fn offset_update_interval(&self) -> Duration {
        Duration::from_millis(self.offset_update_interval_ms)
    }
}

/// Per-sensor session behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Discovery attempts when re-confirming a service identifier after a reset
    pub rediscovery_retries: u32,
    pub rediscovery_wait_ms: u64,
    pub fifo_max_event_count: u32,
    /// Upper bound on buffered calibration biases per session
    pub bias_list_capacity: usize,
    /// Post bias reissues to a dedicated worker when the calibration
    /// connection delivers in realtime mode
    pub low_latency_bias_reissue: bool,
    pub stats_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rediscovery_retries: 60,
            rediscovery_wait_ms: 100,
            fifo_max_event_count: 10_000,
            bias_list_capacity: 64,
            low_latency_bias_reissue: true,
            stats_enabled: false,
        }
    }
}

impl SessionConfig {
    pub fn rediscovery_wait(&self) -> Duration {
        Duration::from_millis(self.rediscovery_wait_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    pub log_dir: PathBuf,
    pub file_logging: bool,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            file_logging: false,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
