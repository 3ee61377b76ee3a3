// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::codec::CodecError;
use sensorhub_connection::ConnectionError;
use sensorhub_executor::ExecutorError;

/// Result type alias using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Rediscovery did not find the sensor's identifier
    #[error("Service for {0} unavailable")]
    ServiceUnavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another activate/deactivate is in progress
    #[error("Session busy: {0}")]
    Busy(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Reset recovery gave up; only ever logged
    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),
}
