// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-activation delivery statistics

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    samples: u64,
    min_latency_ns: u64,
    max_latency_ns: u64,
    total_latency_ns: u128,
    active_since_ns: Option<u64>,
}

/// Snapshot of [`SessionStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsReport {
    pub samples: u64,
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    pub avg_latency_ns: u64,
    pub served_ns: u64,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples in {} ms, latency min/avg/max {}/{}/{} us",
            self.samples,
            self.served_ns / 1_000_000,
            self.min_latency_ns / 1_000,
            self.avg_latency_ns / 1_000,
            self.max_latency_ns / 1_000
        )
    }
}

impl SessionStats {
    /// Reset counters at activation
    pub fn begin(&mut self, now_ns: u64) {
        *self = Self {
            active_since_ns: Some(now_ns),
            ..Self::default()
        };
    }

    /// Host receive time minus the sample's translated timestamp
    pub fn record(&mut self, latency_ns: u64) {
        if self.samples == 0 || latency_ns < self.min_latency_ns {
            self.min_latency_ns = latency_ns;
        }
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
        self.total_latency_ns += latency_ns as u128;
        self.samples += 1;
    }

    pub fn report(&self, now_ns: u64) -> StatsReport {
        let avg_latency_ns = if self.samples == 0 {
            0
        } else {
            (self.total_latency_ns / self.samples as u128) as u64
        };
        StatsReport {
            samples: self.samples,
            min_latency_ns: self.min_latency_ns,
            max_latency_ns: self.max_latency_ns,
            avg_latency_ns,
            served_ns: self
                .active_since_ns
                .map_or(0, |since| now_ns.saturating_sub(since)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_summary() {
        let mut stats = SessionStats::default();
        stats.begin(1_000);
        for latency in [3_000, 1_000, 2_000] {
            stats.record(latency);
        }
        let report = stats.report(5_001_000);
        assert_eq!(report.samples, 3);
        assert_eq!(report.min_latency_ns, 1_000);
        assert_eq!(report.max_latency_ns, 3_000);
        assert_eq!(report.avg_latency_ns, 2_000);
        assert_eq!(report.served_ns, 5_000_000);
    }

    #[test]
    fn test_begin_clears_previous_activation() {
        let mut stats = SessionStats::default();
        stats.begin(0);
        stats.record(10);
        stats.begin(100);
        assert_eq!(stats.report(100), StatsReport::default());
    }
}
