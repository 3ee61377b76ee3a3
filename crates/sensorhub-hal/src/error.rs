// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for platform primitives

/// Result type alias using HalError
pub type Result<T> = std::result::Result<T, HalError>;

#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// Writing a wake-lock name to the kernel interface failed
    #[error("Wake lock '{name}' {op} failed: {source}")]
    WakeLock {
        name: String,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}
