// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Platform implementations for hosted (std) targets

#[cfg(unix)]
pub mod boottime;
pub mod counter;
pub mod sysfs;

#[cfg(unix)]
pub use boottime::BootTimeClock;
pub use counter::ArchCounter;
pub use sysfs::{SysfsRestartTrigger, SysfsWakeLock};

#[cfg(unix)]
use crate::{PlatformServices, Result};
#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use std::sync::Arc;

/// Real platform services for a Linux host
///
/// `restart_path` is the sysfs node that restarts the sensor coprocessor.
#[cfg(unix)]
pub fn linux_platform(fallback_counter_hz: u64, restart_path: PathBuf) -> Result<PlatformServices> {
    let clock = Arc::new(BootTimeClock::new()?);
    Ok(PlatformServices {
        counter: Arc::new(ArchCounter::new(fallback_counter_hz)),
        clock,
        wake_lock: Arc::new(SysfsWakeLock::default()),
        restart: Arc::new(SysfsRestartTrigger::new(restart_path)),
    })
}
