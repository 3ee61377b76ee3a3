// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the connection layer

use sensorhub_executor::ExecutorError;

/// Result type alias using ConnectionError
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Errors reported by the underlying transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transport timed out")]
    Timeout,

    #[error("Transport busy")]
    Busy,

    #[error("Service returned error code {0}")]
    Service(i32),

    #[error("Channel disconnected")]
    Disconnected,

    #[error("Transport internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Transient errors worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Busy)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Service unavailable after {attempts} discovery attempts")]
    ServiceUnavailable { attempts: u32 },

    #[error("Payload of {len} bytes exceeds frame limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Send failed after {attempts} attempts: {last}")]
    SendFailed { attempts: u32, last: TransportError },

    #[error("Connection is not open")]
    NotConnected,

    #[error("Connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ConnectionError {
    /// Check if error is retryable by the caller (e.g. rediscovery loops)
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectionError::ServiceUnavailable { .. } => true,
            ConnectionError::Transport(e) => e.is_retryable(),
            ConnectionError::SendFailed { last, .. } => last.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Busy.is_retryable());
        assert!(!TransportError::Service(-3).is_retryable());
        assert!(!ConnectionError::PayloadTooLarge { len: 2000, max: 1000 }.is_retryable());
        assert!(ConnectionError::from(TransportError::Busy).is_retryable());
    }
}
