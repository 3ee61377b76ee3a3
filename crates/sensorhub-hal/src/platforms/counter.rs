// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::CounterSource;
#[cfg(not(target_arch = "aarch64"))]
use std::time::Instant;

/// Architecture counter register
///
/// On aarch64 this reads `cntvct_el0`/`cntfrq_el0` directly. Other targets
/// have no shared counter, so ticks are synthesized from `Instant` at the
/// configured fallback frequency.
#[derive(Debug)]
pub struct ArchCounter {
    frequency_hz: u64,
    #[cfg(not(target_arch = "aarch64"))]
    anchor: Instant,
}

impl ArchCounter {
    pub fn new(fallback_frequency_hz: u64) -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            let hw = read_cntfrq();
            let frequency_hz = if hw == 0 { fallback_frequency_hz } else { hw };
            Self { frequency_hz }
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            Self {
                frequency_hz: fallback_frequency_hz.max(1),
                anchor: Instant::now(),
            }
        }
    }
}

impl CounterSource for ArchCounter {
    #[cfg(target_arch = "aarch64")]
    fn read_counter_ticks(&self) -> u64 {
        read_cntvct()
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn read_counter_ticks(&self) -> u64 {
        let nanos = self.anchor.elapsed().as_nanos();
        (nanos * self.frequency_hz as u128 / 1_000_000_000).min(u64::MAX as u128) as u64
    }

    fn counter_frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}

#[cfg(target_arch = "aarch64")]
fn read_cntvct() -> u64 {
    let value: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on every supported kernel
    unsafe {
        core::arch::asm!("isb", "mrs {}, cntvct_el0", out(reg) value, options(nomem, nostack));
    }
    value
}

#[cfg(target_arch = "aarch64")]
fn read_cntfrq() -> u64 {
    let value: u64;
    // SAFETY: cntfrq_el0 is readable from EL0
    unsafe {
        core::arch::asm!("mrs {}, cntfrq_el0", out(reg) value, options(nomem, nostack));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic() {
        let counter = ArchCounter::new(19_200_000);
        let a = counter.read_counter_ticks();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = counter.read_counter_ticks();
        assert!(b > a);
        assert!(counter.counter_frequency_hz() > 0);
    }
}
