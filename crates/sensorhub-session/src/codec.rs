// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Request and event codec boundary
//!
//! Payload schemas belong to the coprocessor protocol, so the session only
//! speaks through [`MessageCodec`]. [`JsonCodec`] is the in-tree encoding used
//! by the loopback transport, the simulator and tests.

use crate::batching::BatchingPlan;
use crate::types::{DeliveryType, QualityStatus};
use sensorhub_connection::ServiceIdentifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty payload")]
    Empty,
}

/// What a request asks the target service to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    StreamConfig {
        sample_rate_hz: f32,
    },
    OnChangeConfig,
    /// Stream `sensor` through the resampler at `rate_hz`
    ResamplerConfig {
        sensor: ServiceIdentifier,
        rate_hz: f32,
        filter: bool,
    },
    Flush,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub target: ServiceIdentifier,
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batching: Option<BatchingPlan>,
    pub delivery: DeliveryType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_wakeup_msg_ids: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sample,
    Calibration,
    FlushComplete,
    Other(u32),
}

fn unreliable() -> QualityStatus {
    QualityStatus::Unreliable
}

/// One event out of an indication payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub kind: EventKind,
    /// Coprocessor counter ticks
    pub timestamp: u64,
    #[serde(default)]
    pub values: Vec<f32>,
    #[serde(default = "unreliable")]
    pub quality: QualityStatus,
}

impl DecodedEvent {
    pub fn sample(timestamp: u64, values: Vec<f32>, quality: QualityStatus) -> Self {
        Self {
            kind: EventKind::Sample,
            timestamp,
            values,
            quality,
        }
    }

    pub fn calibration(timestamp: u64, bias: [f32; 3], quality: QualityStatus) -> Self {
        Self {
            kind: EventKind::Calibration,
            timestamp,
            values: bias.to_vec(),
            quality,
        }
    }

    pub fn flush_complete(timestamp: u64) -> Self {
        Self {
            kind: EventKind::FlushComplete,
            timestamp,
            values: Vec::new(),
            quality: QualityStatus::Unreliable,
        }
    }
}

pub trait MessageCodec: Send + Sync {
    fn encode_request(&self, request: &ConfigRequest) -> Result<Vec<u8>, CodecError>;

    /// All events carried by one indication, in payload order
    fn decode_events(&self, payload: &[u8]) -> Result<Vec<DecodedEvent>, CodecError>;
}

#[derive(Serialize, Deserialize)]
struct EventBatch {
    events: Vec<DecodedEvent>,
}

/// `{"events": [...]}` indications and one JSON object per request
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Build an indication payload, as the coprocessor side would
    pub fn encode_events(&self, events: &[DecodedEvent]) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&EventBatch {
            events: events.to_vec(),
        })?)
    }

    /// Parse a request frame, as the coprocessor side would
    pub fn decode_request(&self, frame: &[u8]) -> Result<ConfigRequest, CodecError> {
        if frame.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(serde_json::from_slice(frame)?)
    }
}

impl MessageCodec for JsonCodec {
    fn encode_request(&self, request: &ConfigRequest) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(request)?)
    }

    fn decode_events(&self, payload: &[u8]) -> Result<Vec<DecodedEvent>, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::Empty);
        }
        let batch: EventBatch = serde_json::from_slice(payload)?;
        Ok(batch.events)
    }
}
