// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Host elapsed-real-time clock
//!
//! Reads `CLOCK_BOOTTIME` on Linux and Android: nanoseconds since boot,
//! still counting while the system is suspended. Other unix targets have no
//! boot clock and fall back to `CLOCK_MONOTONIC`.

use crate::{HalError, HostClock, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::error;

#[cfg(any(target_os = "linux", target_os = "android"))]
const CLOCK_ID: libc::clockid_t = libc::CLOCK_BOOTTIME;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const CLOCK_ID: libc::clockid_t = libc::CLOCK_MONOTONIC;

fn read_clock() -> std::io::Result<u64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call
    let rc = unsafe { libc::clock_gettime(CLOCK_ID, &mut ts) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let nanos = ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64;
    Ok(nanos)
}

/// Boot-relative host clock, the domain sensor timestamps are published in
#[derive(Debug)]
pub struct BootTimeClock {
    /// Returned if a later read fails, so time never goes backwards
    last_ns: AtomicU64,
}

impl BootTimeClock {
    /// Fails if the kernel does not provide the clock
    pub fn new() -> Result<Self> {
        let now = read_clock().map_err(HalError::Io)?;
        Ok(Self {
            last_ns: AtomicU64::new(now),
        })
    }
}

impl HostClock for BootTimeClock {
    fn elapsed_realtime_nanos(&self) -> u64 {
        match read_clock() {
            Ok(now) => {
                self.last_ns.fetch_max(now, Ordering::Relaxed);
                now
            }
            Err(e) => {
                error!("[CLOCK] boot clock read failed: {}", e);
                self.last_ns.load(Ordering::Relaxed)
            }
        }
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_clock_advances() {
        let clock = BootTimeClock::new().unwrap();
        let a = clock.elapsed_realtime_nanos();
        clock.sleep(Duration::from_millis(2));
        let b = clock.elapsed_realtime_nanos();
        assert!(b >= a + 2_000_000);
    }

    #[test]
    fn test_clocks_share_one_epoch() {
        let first = BootTimeClock::new().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let second = BootTimeClock::new().unwrap();
        let a = first.elapsed_realtime_nanos();
        let b = second.elapsed_realtime_nanos();
        // Not anchored at construction: both read the same kernel clock
        assert!(b >= a);
        assert!(b - a < 10_000_000);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_clock_is_boot_relative() {
        let clock = BootTimeClock::new().unwrap();
        let uptime = std::fs::read_to_string("/proc/uptime").unwrap();
        let uptime_s: f64 = uptime
            .split_whitespace()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let uptime_ns = (uptime_s * 1e9) as i128;
        let host_ns = clock.elapsed_realtime_nanos() as i128;
        assert!(
            (host_ns - uptime_ns).abs() < 1_000_000_000,
            "host {} ns vs uptime {} ns",
            host_ns,
            uptime_ns
        );
    }
}
