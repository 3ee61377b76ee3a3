// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Coprocessor restart policy
//!
//! Shared by every connection in the process. Counts consecutive failed
//! sends and forwards restart requests to the platform, never more often
//! than once per `response_timeout + watchdog_extra_wait`.

use parking_lot::Mutex;
use sensorhub_config::ConnectionConfig;
use sensorhub_hal::{HostClock, RestartTrigger};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct RestartGovernor {
    trigger: Arc<dyn RestartTrigger>,
    clock: Arc<dyn HostClock>,
    threshold: u32,
    restart_on_send_failure: bool,
    min_interval_ns: u64,
    consecutive_failures: AtomicU32,
    last_trigger_ns: Mutex<Option<u64>>,
    requested: AtomicUsize,
}

impl RestartGovernor {
    pub fn new(
        trigger: Arc<dyn RestartTrigger>,
        clock: Arc<dyn HostClock>,
        config: &ConnectionConfig,
    ) -> Self {
        Self {
            trigger,
            clock,
            threshold: config.error_restart_threshold,
            restart_on_send_failure: config.restart_on_send_failure,
            min_interval_ns: config.watchdog_deadline().as_nanos() as u64,
            consecutive_failures: AtomicU32::new(0),
            last_trigger_ns: Mutex::new(None),
            requested: AtomicUsize::new(0),
        }
    }

    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if previous > 0 {
            info!("[RESTART] send recovered after {} consecutive failures", previous);
        }
    }

    /// Count a failed send; returns whether a restart was requested
    pub fn record_failure(&self, reason: &str) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!("[RESTART] consecutive send failures: {} ({})", failures, reason);
        if failures <= self.threshold {
            return false;
        }
        if !self.restart_on_send_failure {
            return false;
        }
        let triggered = self.request_restart(&format!(
            "{} consecutive send failures: {}",
            failures, reason
        ));
        if triggered {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
        triggered
    }

    /// Ask the platform to restart the coprocessor, subject to the rate limit
    pub fn request_restart(&self, reason: &str) -> bool {
        let now = self.clock.elapsed_realtime_nanos();
        let mut last = self.last_trigger_ns.lock();
        if let Some(previous) = *last {
            if now.saturating_sub(previous) < self.min_interval_ns {
                warn!("[RESTART] suppressed (rate limited): {}", reason);
                return false;
            }
        }
        *last = Some(now);
        drop(last);

        error!("[RESTART] requesting coprocessor restart: {}", reason);
        self.requested.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.trigger.trigger_restart(reason) {
            error!("[RESTART] restart trigger failed: {}", e);
        }
        true
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Restart requests that passed the rate limit
    pub fn restarts_requested(&self) -> usize {
        self.requested.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RestartGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartGovernor")
            .field("threshold", &self.threshold)
            .field("restart_on_send_failure", &self.restart_on_send_failure)
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}
