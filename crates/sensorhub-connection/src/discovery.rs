// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Service identifiers, discovery, and the process-wide access latch

use crossbeam::channel;
use sensorhub_config::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// 128-bit identifier naming a data source on the coprocessor
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ServiceIdentifier {
    pub high: u64,
    pub low: u64,
}

impl ServiceIdentifier {
    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

pub type DiscoveryCallback = Box<dyn FnOnce(Vec<ServiceIdentifier>) + Send + 'static>;

/// Looks up identifiers for a data-type name ("accel", "gyro_cal", ...)
pub trait ServiceDiscovery: Send + Sync {
    /// Deliver zero or more identifiers to `on_result`, possibly from another thread
    fn lookup(&self, data_type: &str, on_result: DiscoveryCallback);
}

/// Run a lookup and wait up to `timeout` for its answer
///
/// A lookup that never answers yields an empty list.
pub fn discover_blocking(
    discovery: &dyn ServiceDiscovery,
    data_type: &str,
    timeout: Duration,
) -> Vec<ServiceIdentifier> {
    let (tx, rx) = channel::bounded(1);
    discovery.lookup(
        data_type,
        Box::new(move |ids| {
            let _ = tx.send(ids);
        }),
    );
    match rx.recv_timeout(timeout) {
        Ok(ids) => {
            debug!("[CONNECTION] discovered {} for {}", ids.len(), data_type);
            ids
        }
        Err(_) => {
            warn!("[CONNECTION] discovery of {} timed out after {:?}", data_type, timeout);
            Vec::new()
        }
    }
}

/// Remembers whether the service has been reached in this process
///
/// Once reached, discovery uses a shorter budget. A transport error clears
/// the latch so the reconnect after a coprocessor restart gets the full one.
#[derive(Debug, Default)]
pub struct ServiceAccessLatch {
    accessed: AtomicBool,
}

impl ServiceAccessLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_accessed(&self) {
        self.accessed.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.accessed.store(false, Ordering::SeqCst);
    }

    pub fn has_accessed(&self) -> bool {
        self.accessed.load(Ordering::SeqCst)
    }

    /// (attempts, per-attempt timeout) for the next discovery
    pub fn budget(&self, config: &ConnectionConfig) -> (u32, Duration) {
        if self.has_accessed() {
            (
                config.discovery_attempts_after_access,
                Duration::from_millis(config.discovery_timeout_after_access_ms),
            )
        } else {
            (
                config.discovery_attempts,
                Duration::from_millis(config.discovery_timeout_ms),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl ServiceDiscovery for Silent {
        fn lookup(&self, _data_type: &str, _on_result: DiscoveryCallback) {}
    }

    #[test]
    fn test_budget_shrinks_after_access() {
        let latch = ServiceAccessLatch::new();
        let config = ConnectionConfig::default();
        assert_eq!(latch.budget(&config), (4, Duration::from_secs(2)));

        latch.mark_accessed();
        assert_eq!(latch.budget(&config), (2, Duration::from_millis(500)));

        latch.clear();
        assert_eq!(latch.budget(&config), (4, Duration::from_secs(2)));
    }

    #[test]
    fn test_unanswered_lookup_is_empty() {
        let ids = discover_blocking(&Silent, "accel", Duration::from_millis(10));
        assert!(ids.is_empty());
    }

    #[test]
    fn test_identifier_display_is_hex() {
        let id = ServiceIdentifier::new(0xabc, 1);
        assert_eq!(id.to_string(), "0000000000000abc0000000000000001");
    }
}
