// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub-executor
//!
//! One dedicated thread per connection that runs callbacks strictly in
//! submission order, holding a shared wake-lock reference for every task
//! that is queued or running.

pub mod error;
pub mod executor;
pub mod wakelock;

pub use error::{ExecutorError, Result};
pub use executor::{TaskExecutor, TaskPayload};
pub use wakelock::{WakeLock, WakeLockRegistry};
