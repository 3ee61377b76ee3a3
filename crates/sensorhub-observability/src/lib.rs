// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub-observability
//!
//! Logging setup shared by every sensorhub binary, with per-crate debug
//! flag support.
//!
//! ## Features
//! - `file-logging`: per-crate JSON log files with run folders and retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known sensorhub crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "sensorhub",
    "sensorhub-config",
    "sensorhub-hal",
    "sensorhub-executor",
    "sensorhub-timesync",
    "sensorhub-connection",
    "sensorhub-session",
];

/// Tracing targets use the library name, which swaps `-` for `_`
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
