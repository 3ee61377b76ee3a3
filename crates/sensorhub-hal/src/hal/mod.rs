// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Hardware counter shared with the coprocessor.
pub mod counter;
/// Host time source and sleep.
pub mod clock;
/// Coprocessor restart requests.
pub mod restart;
/// System wake assertion.
pub mod wakelock;

pub use clock::HostClock;
pub use counter::{ticks_to_nanos, CounterSource};
pub use restart::RestartTrigger;
pub use wakelock::WakeLockBackend;

use std::sync::Arc;

/// Bundle of platform services injected into the runtime at startup
#[derive(Clone)]
pub struct PlatformServices {
    pub counter: Arc<dyn CounterSource>,
    pub clock: Arc<dyn HostClock>,
    pub wake_lock: Arc<dyn WakeLockBackend>,
    pub restart: Arc<dyn RestartTrigger>,
}

impl std::fmt::Debug for PlatformServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformServices")
            .field("counter_frequency_hz", &self.counter.counter_frequency_hz())
            .finish_non_exhaustive()
    }
}
