// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub-hal
//!
//! Narrow platform traits the runtime is written against, so the executor,
//! clock translator and connection layers stay platform-neutral:
//!
//! - [`CounterSource`]: the coprocessor-shared free-running counter register
//! - [`HostClock`]: host elapsed real time (boot clock) plus an injectable sleep
//! - [`WakeLockBackend`]: named system wake assertion
//! - [`RestartTrigger`]: request a coprocessor subsystem restart
//!
//! `platforms` holds the real implementations, `sim` holds deterministic
//! ones for the simulator and tests.

pub mod error;
pub mod hal;
pub mod platforms;
pub mod sim;

pub use error::{HalError, Result};
pub use hal::*;
