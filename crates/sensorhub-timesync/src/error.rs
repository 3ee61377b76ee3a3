// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Result type alias using TimeSyncError
pub type Result<T> = std::result::Result<T, TimeSyncError>;

#[derive(Debug, thiserror::Error)]
pub enum TimeSyncError {
    #[error("Counter frequency must be non-zero")]
    InvalidFrequency,

    #[error("Clock translator used before init()")]
    NotInitialized,

    #[error("Offset updater already running")]
    AlreadyRunning,

    #[error("Failed to spawn offset updater thread: {0}")]
    Spawn(#[from] std::io::Error),
}
