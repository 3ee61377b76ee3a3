// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sensor descriptions and the events a session emits

use crossbeam::channel::Sender;
use sensorhub_connection::ServiceIdentifier;
use serde::{Deserialize, Serialize};

/// Maximum number of values carried by one sample
pub const MAX_SAMPLE_VALUES: usize = 16;

/// Reliability grade, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Unreliable,
    Low,
    Medium,
    High,
}

impl QualityStatus {
    pub fn is_reliable(self) -> bool {
        self != QualityStatus::Unreliable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBias {
    pub bias: [f32; 3],
    /// Coprocessor counter ticks
    pub timestamp: u64,
    pub quality: QualityStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Wakeup,
    NoWakeup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMode {
    Continuous,
    OnChange,
}

/// Paired calibration stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationSource {
    pub data_type: String,
    pub service_id: ServiceIdentifier,
}

/// Static description of one logical sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorInfo {
    pub handle: i32,
    pub name: String,
    /// Discovery name, e.g. "accel"
    pub data_type: String,
    pub service_id: ServiceIdentifier,
    pub wakeup: bool,
    pub reporting_mode: ReportingMode,
    pub fifo_reserved_event_count: u32,
    pub calibration: Option<CalibrationSource>,
    /// Route streaming requests through the resampler service
    pub resampler: Option<ServiceIdentifier>,
    /// Turn flush events into flush-complete notifications
    pub honor_flush_events: bool,
    /// Message ids that must not wake the host
    pub no_wakeup_msg_ids: Vec<u32>,
}

impl SensorInfo {
    /// Streaming, non-wakeup sensor with no calibration pairing
    pub fn streaming(
        handle: i32,
        data_type: impl Into<String>,
        service_id: ServiceIdentifier,
    ) -> Self {
        let data_type = data_type.into();
        Self {
            handle,
            name: data_type.clone(),
            data_type,
            service_id,
            wakeup: false,
            reporting_mode: ReportingMode::Continuous,
            fifo_reserved_event_count: 0,
            calibration: None,
            resampler: None,
            honor_flush_events: true,
            no_wakeup_msg_ids: Vec::new(),
        }
    }

    pub fn delivery_type(&self) -> DeliveryType {
        if self.wakeup {
            DeliveryType::Wakeup
        } else {
            DeliveryType::NoWakeup
        }
    }
}

/// Rate and latency requested by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorParams {
    pub sample_period_ns: u64,
    pub max_latency_ns: u64,
}

/// Finished sample in the host time domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSample {
    pub handle: i32,
    pub timestamp_ns: i64,
    pub values: Vec<f32>,
    pub quality: QualityStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SensorEvent {
    Sample(SensorSample),
    FlushComplete { handle: i32, timestamp_ns: i64 },
}

/// Consumer of finished events
///
/// Called from whichever executor thread processed the event; different
/// sensors may call concurrently.
pub trait SampleSink: Send + Sync {
    fn on_event(&self, event: SensorEvent);
}

impl SampleSink for Sender<SensorEvent> {
    fn on_event(&self, event: SensorEvent) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_ordering_is_worst_first() {
        assert!(QualityStatus::Unreliable < QualityStatus::Low);
        assert!(QualityStatus::Low < QualityStatus::Medium);
        assert!(QualityStatus::Medium < QualityStatus::High);
        assert_eq!(
            QualityStatus::Medium.min(QualityStatus::High),
            QualityStatus::Medium
        );
        assert!(!QualityStatus::Unreliable.is_reliable());
    }
}
