// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Result type alias using ExecutorError
pub type Result<T> = std::result::Result<T, ExecutorError>;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A wake lock can be attached once per executor
    #[error("Executor '{0}' already has a wake lock attached")]
    AlreadyConfigured(String),

    #[error("Executor '{0}' is already running")]
    AlreadyRunning(String),

    /// Submissions are rejected once `stop()` has begun
    #[error("Executor '{0}' is stopped")]
    Stopped(String),

    #[error("Failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}
