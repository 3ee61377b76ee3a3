// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub-timesync
//!
//! Maps the coprocessor's free-running counter onto host monotonic time.
//! A single [`ClockTranslator`] is built at startup and shared by every
//! session; [`OffsetUpdater`] optionally keeps it fresh from a background
//! thread.

pub mod error;
pub mod translator;
pub mod updater;

pub use error::{Result, TimeSyncError};
pub use translator::ClockTranslator;
pub use updater::OffsetUpdater;
