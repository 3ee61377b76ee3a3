// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub-session
//!
//! Calibration bias pipeline: one [`SensorSession`] per logical sensor.
//!
//! A session owns a primary connection for its data stream and, when the
//! sensor has a paired calibration source, a second connection for biases.
//! Samples are corrected with the newest bias not after them, stamped in
//! the host time domain and handed to a [`SampleSink`].

pub mod batching;
pub mod bias;
pub mod codec;
pub mod error;
pub mod session;
pub mod stats;
pub mod types;

pub use batching::{compute_batching, BatchingPlan};
pub use bias::BiasList;
pub use codec::{
    CodecError, ConfigRequest, DecodedEvent, EventKind, JsonCodec, MessageCodec, RequestKind,
};
pub use error::{Result, SessionError};
pub use session::{SensorSession, SessionContext, SessionState, WAKEUP_LOCK_NAME};
pub use stats::{SessionStats, StatsReport};
pub use types::{
    CalibrationBias, CalibrationSource, DeliveryType, QualityStatus, ReportingMode, SampleSink,
    SensorEvent, SensorInfo, SensorParams, SensorSample, MAX_SAMPLE_VALUES,
};
