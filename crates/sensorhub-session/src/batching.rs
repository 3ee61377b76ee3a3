// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Batch and flush period derivation
//!
//! Continuous sensors cannot batch longer than their FIFO holds. Non-wakeup
//! sensors additionally get a flush period sized to their reserved FIFO
//! share, so their samples survive a host suspend.

use crate::types::{ReportingMode, SensorInfo, SensorParams};
use serde::{Deserialize, Serialize};
use tracing::info;

const NANOS_PER_MICRO: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchingPlan {
    pub batch_period_us: u32,
    /// 0 when no flush period is requested
    pub flush_period_us: u32,
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

pub fn compute_batching(
    info: &SensorInfo,
    params: &SensorParams,
    fifo_max_event_count: u32,
) -> BatchingPlan {
    let continuous = info.reporting_mode == ReportingMode::Continuous;
    let sample_period_us = params.sample_period_ns / NANOS_PER_MICRO;
    let mut batch_period_us = clamp_u32(params.max_latency_ns / NANOS_PER_MICRO);

    if continuous {
        let batch_max_us = clamp_u32(sample_period_us.saturating_mul(fifo_max_event_count as u64));
        if batch_period_us > batch_max_us {
            info!(
                "[SESSION] {} batch period {} us capped to {} us",
                info.data_type, batch_period_us, batch_max_us
            );
            batch_period_us = batch_max_us;
        }
    }

    let mut flush_period_us = 0;
    if !info.wakeup {
        flush_period_us = if continuous {
            clamp_u32(sample_period_us.saturating_mul(info.fifo_reserved_event_count as u64))
        } else if info.fifo_reserved_event_count > 0 {
            u32::MAX
        } else {
            0
        };
        if flush_period_us <= batch_period_us {
            flush_period_us = 0;
        }
    }

    BatchingPlan {
        batch_period_us,
        flush_period_us,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_connection::ServiceIdentifier;

    fn sensor(wakeup: bool, mode: ReportingMode, reserved: u32) -> SensorInfo {
        SensorInfo {
            wakeup,
            reporting_mode: mode,
            fifo_reserved_event_count: reserved,
            ..SensorInfo::streaming(1, "accel", ServiceIdentifier::new(1, 1))
        }
    }

    fn params(period_ms: u64, latency_ms: u64) -> SensorParams {
        SensorParams {
            sample_period_ns: period_ms * 1_000_000,
            max_latency_ns: latency_ms * 1_000_000,
        }
    }

    #[test]
    fn test_batch_capped_by_fifo_depth() {
        // 20 ms period, 100-event FIFO: at most 2 s of batching
        let plan = compute_batching(
            &sensor(true, ReportingMode::Continuous, 0),
            &params(20, 10_000),
            100,
        );
        assert_eq!(plan.batch_period_us, 2_000_000);
        assert_eq!(plan.flush_period_us, 0);
    }

    #[test]
    fn test_non_wakeup_continuous_flush_from_reserved_count() {
        let plan = compute_batching(
            &sensor(false, ReportingMode::Continuous, 300),
            &params(20, 100),
            10_000,
        );
        assert_eq!(plan.batch_period_us, 100_000);
        assert_eq!(plan.flush_period_us, 6_000_000);
    }

    #[test]
    fn test_flush_not_sent_when_not_longer_than_batch() {
        let plan = compute_batching(
            &sensor(false, ReportingMode::Continuous, 5),
            &params(20, 1_000),
            10_000,
        );
        assert_eq!(plan.batch_period_us, 1_000_000);
        assert_eq!(plan.flush_period_us, 0);
    }

    #[test]
    fn test_non_wakeup_on_change_with_reserved_fifo_flushes_at_max() {
        let plan = compute_batching(
            &sensor(false, ReportingMode::OnChange, 10),
            &params(0, 500),
            10_000,
        );
        assert_eq!(plan.batch_period_us, 500_000);
        assert_eq!(plan.flush_period_us, u32::MAX);
    }

    #[test]
    fn test_wakeup_sensor_never_gets_flush_period() {
        let plan = compute_batching(
            &sensor(true, ReportingMode::OnChange, 10),
            &params(0, 500),
            10_000,
        );
        assert_eq!(plan.flush_period_us, 0);
    }
}
