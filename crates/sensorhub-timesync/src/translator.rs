// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Counter tick to host nanosecond translation
//!
//! The offset is `host_ns - counter_ns`, sampled by bracketing one host clock
//! read between two counter reads. A sample is accepted once the bracket is
//! narrower than the jitter threshold; otherwise the narrowest bracket seen
//! within the iteration budget is kept.

use crate::error::{Result, TimeSyncError};
use parking_lot::RwLock;
use sensorhub_config::TimeSyncConfig;
use sensorhub_hal::{ticks_to_nanos, CounterSource, HostClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, Default)]
struct OffsetState {
    offset_ns: i64,
    /// Host time of the last refresh
    refreshed_at_ns: u64,
    initialized: bool,
}

/// Shared clock-domain translator
///
/// Built once at startup and handed to every session. Reads take a shared
/// lock; refreshes take the exclusive lock only to store the result.
pub struct ClockTranslator {
    counter: Arc<dyn CounterSource>,
    clock: Arc<dyn HostClock>,
    frequency_hz: u64,
    refresh_interval_ns: u64,
    jitter_threshold_ns: u64,
    max_iterations: u32,
    state: RwLock<OffsetState>,
}

impl ClockTranslator {
    pub fn new(
        counter: Arc<dyn CounterSource>,
        clock: Arc<dyn HostClock>,
        config: &TimeSyncConfig,
    ) -> Result<Self> {
        let frequency_hz = counter.counter_frequency_hz();
        if frequency_hz == 0 {
            return Err(TimeSyncError::InvalidFrequency);
        }
        Ok(Self {
            counter,
            clock,
            frequency_hz,
            refresh_interval_ns: config.offset_update_interval().as_nanos() as u64,
            jitter_threshold_ns: config.jitter_threshold_ns,
            max_iterations: config.max_iterations.max(1),
            state: RwLock::new(OffsetState::default()),
        })
    }

    /// Compute the initial offset; later calls are no-ops
    pub fn init(&self) -> i64 {
        if !self.is_initialized() {
            self.recalculate_offset(true);
            info!(
                "[TIMESYNC] initialized: counter {} Hz, offset {} ns",
                self.frequency_hz,
                self.offset()
            );
        }
        self.offset()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Raw counter ticks
    pub fn now(&self) -> u64 {
        self.counter.read_counter_ticks()
    }

    pub fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }

    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        ticks_to_nanos(ticks, self.frequency_hz)
    }

    /// Host monotonic nanoseconds for a counter timestamp
    ///
    /// Refreshes the offset first if one is due.
    pub fn ticks_to_host_nanos(&self, ticks: u64) -> i64 {
        self.recalculate_offset(false);
        let nanos = self.ticks_to_nanos(ticks) as i128 + self.offset() as i128;
        nanos.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Last computed offset, without refreshing
    pub fn offset(&self) -> i64 {
        self.state.read().offset_ns
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_nanos(self.refresh_interval_ns)
    }

    /// Recompute the offset if forced or due; returns whether it changed
    ///
    /// A refresh is due when the translator was never initialized, the last
    /// refresh is older than the interval, or host time went backward.
    pub fn recalculate_offset(&self, force: bool) -> bool {
        let host_now = self.clock.elapsed_realtime_nanos();
        {
            let state = self.state.read();
            if !force && state.initialized && !self.is_due(&state, host_now) {
                return false;
            }
            if state.initialized && host_now < state.refreshed_at_ns {
                warn!(
                    "[TIMESYNC] host time moved backward: {} -> {}",
                    state.refreshed_at_ns, host_now
                );
            }
        }

        let (offset_ns, sampled_at) = self.sample_offset();

        let mut state = self.state.write();
        let changed = !state.initialized || state.offset_ns != offset_ns;
        if changed {
            debug!(
                "[TIMESYNC] offset {} -> {} ns",
                state.offset_ns, offset_ns
            );
        }
        state.offset_ns = offset_ns;
        state.refreshed_at_ns = sampled_at;
        state.initialized = true;
        changed
    }

    fn is_due(&self, state: &OffsetState, host_now: u64) -> bool {
        host_now < state.refreshed_at_ns
            || host_now - state.refreshed_at_ns > self.refresh_interval_ns
    }

    /// One bounded sampling round; returns (offset, host time of the sample)
    fn sample_offset(&self) -> (i64, u64) {
        let mut best: Option<(u64, i64, u64)> = None;

        for iteration in 0..self.max_iterations {
            let before = self.counter.read_counter_ticks();
            let host = self.clock.elapsed_realtime_nanos();
            let after = self.counter.read_counter_ticks();

            let gap_ticks = after.saturating_sub(before);
            let gap_ns = self.ticks_to_nanos(gap_ticks);
            let midpoint = before + gap_ticks / 2;
            let offset = (host as i128 - self.ticks_to_nanos(midpoint) as i128)
                .clamp(i64::MIN as i128, i64::MAX as i128) as i64;

            if gap_ns < self.jitter_threshold_ns {
                trace!(
                    "[TIMESYNC] settled after {} iterations (gap {} ns)",
                    iteration + 1,
                    gap_ns
                );
                return (offset, host);
            }
            if best.map_or(true, |(best_gap, _, _)| gap_ns < best_gap) {
                best = Some((gap_ns, offset, host));
            }
        }

        match best {
            Some((gap_ns, offset, host)) => {
                warn!(
                    "[TIMESYNC] counter reads did not settle in {} iterations, best gap {} ns",
                    self.max_iterations, gap_ns
                );
                (offset, host)
            }
            None => (self.offset(), self.clock.elapsed_realtime_nanos()),
        }
    }
}

impl std::fmt::Debug for ClockTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.read();
        f.debug_struct("ClockTranslator")
            .field("frequency_hz", &self.frequency_hz)
            .field("offset_ns", &state.offset_ns)
            .field("initialized", &state.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_hal::sim::SimPlatform;

    const QTIMER_HZ: u64 = 19_200_000;
    const START_NS: u64 = 5_000_000_000;
    const SKEW_NS: i64 = 1_000_000_000;

    fn translator(sim: &SimPlatform) -> ClockTranslator {
        ClockTranslator::new(
            sim.counter.clone(),
            sim.clock.clone(),
            &TimeSyncConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_init_recovers_skew() {
        let sim = SimPlatform::new(START_NS, QTIMER_HZ, SKEW_NS);
        let clock = translator(&sim);
        assert!(!clock.is_initialized());
        assert_eq!(clock.init(), SKEW_NS);
        assert!(clock.is_initialized());
    }

    #[test]
    fn test_ticks_to_host_nanos_applies_offset() {
        let sim = SimPlatform::new(START_NS, QTIMER_HZ, SKEW_NS);
        let clock = translator(&sim);
        clock.init();
        // 1 ms of counter time
        assert_eq!(clock.ticks_to_host_nanos(19_200), 1_000_000 + SKEW_NS);
    }

    #[test]
    fn test_uninitialized_translation_initializes() {
        let sim = SimPlatform::new(START_NS, QTIMER_HZ, SKEW_NS);
        let clock = translator(&sim);
        clock.ticks_to_host_nanos(0);
        assert!(clock.is_initialized());
        assert_eq!(clock.offset(), SKEW_NS);
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let sim = SimPlatform::new(START_NS, 0, 0);
        let result = ClockTranslator::new(
            sim.counter.clone(),
            sim.clock.clone(),
            &TimeSyncConfig::default(),
        );
        assert!(matches!(result, Err(TimeSyncError::InvalidFrequency)));
    }
}
