// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Host time domain that sensor timestamps are published in
///
/// Retry loops sleep through this trait so tests can advance time
/// without waiting on the wall clock.
pub trait HostClock: Send + Sync {
    /// Nanoseconds since boot, including time spent suspended
    fn elapsed_realtime_nanos(&self) -> u64;

    fn sleep(&self, duration: Duration);
}
