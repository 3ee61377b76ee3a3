// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Free-running counter readable by both host and coprocessor
pub trait CounterSource: Send + Sync {
    /// Current counter value; must not make a syscall on real hardware
    fn read_counter_ticks(&self) -> u64;

    /// Tick rate of the counter, never zero
    fn counter_frequency_hz(&self) -> u64;
}

/// Convert counter ticks to nanoseconds at `frequency_hz`
///
/// Widens to `u128` so a full 64-bit tick range cannot overflow.
pub fn ticks_to_nanos(ticks: u64, frequency_hz: u64) -> u64 {
    if frequency_hz == 0 {
        return 0;
    }
    let nanos = ticks as u128 * NANOS_PER_SEC / frequency_hz as u128;
    nanos.min(u64::MAX as u128) as u64
}
