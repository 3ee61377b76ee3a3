// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry with backoff
//!
//! Sleeps go through [`HostClock`] so tests drive retry loops without
//! wall-clock delay.

use crate::error::TransportError;
use sensorhub_hal::HostClock;
use std::time::Duration;
use tracing::{info, warn};

const MAX_BACKOFF_MS: u64 = 60_000;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

/// Retry schedule: exponential or constant backoff, bounded attempts
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    exponential: bool,
    current_attempt: u32,
    /// 0 = unbounded
    max_attempts: u32,
}

impl RetryStrategy {
    /// Exponential backoff doubling from `base_backoff_ms`, capped at 60 s
    pub fn exponential(base_backoff_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_backoff_ms,
            max_backoff_ms: MAX_BACKOFF_MS,
            exponential: true,
            current_attempt: 0,
            max_attempts,
        }
    }

    /// Same delay before every retry
    pub fn constant(backoff_ms: u64, max_attempts: u32) -> Self {
        Self {
            exponential: false,
            ..Self::exponential(backoff_ms, max_attempts)
        }
    }

    /// Delay before the next retry, or `None` once the budget is spent
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.current_attempt += 1;

        let backoff_ms = if !self.exponential || self.current_attempt == 1 {
            self.base_backoff_ms
        } else {
            let exp = 2u64.saturating_pow(self.current_attempt - 1);
            self.base_backoff_ms.saturating_mul(exp).min(self.max_backoff_ms)
        };
        Some(Duration::from_millis(backoff_ms.min(self.max_backoff_ms)))
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Retries taken so far
    pub fn attempt_number(&self) -> u32 {
        self.current_attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.current_attempt >= self.max_attempts
    }
}

/// Run `operation` until it succeeds, fails permanently, or the strategy runs out
///
/// On failure the strategy is left as-is so the caller can read how many
/// retries were spent.
pub fn retry_with_backoff<T, E, F>(
    mut operation: F,
    strategy: &mut RetryStrategy,
    clock: &dyn HostClock,
    operation_name: &str,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    loop {
        match operation() {
            Ok(result) => {
                if strategy.attempt_number() > 0 {
                    info!(
                        "[RECONNECT] {} succeeded after {} retries",
                        operation_name,
                        strategy.attempt_number()
                    );
                }
                strategy.reset();
                return Ok(result);
            }
            Err(e) if e.is_retryable() => match strategy.next_backoff() {
                Some(backoff) => {
                    warn!(
                        "[RECONNECT] {} failed (attempt {}): {} - retrying in {:?}",
                        operation_name,
                        strategy.attempt_number(),
                        e,
                        backoff
                    );
                    clock.sleep(backoff);
                }
                None => {
                    warn!(
                        "[RECONNECT] {} failed after {} retries - giving up",
                        operation_name,
                        strategy.attempt_number()
                    );
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_hal::sim::ManualClock;

    #[test]
    fn test_exponential_backoff() {
        let mut strategy = RetryStrategy::exponential(100, 5);
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(400)));
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(800)));
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(1600)));
        assert_eq!(strategy.next_backoff(), None);
    }

    #[test]
    fn test_backoff_capped() {
        let mut strategy = RetryStrategy::exponential(1000, 20);
        for _ in 0..10 {
            strategy.next_backoff();
        }
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(60_000)));
    }

    #[test]
    fn test_constant_backoff() {
        let mut strategy = RetryStrategy::constant(10, 3);
        for _ in 0..3 {
            assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(10)));
        }
        assert!(strategy.is_exhausted());
        assert_eq!(strategy.next_backoff(), None);
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let mut strategy = RetryStrategy::exponential(100, 0);
        for _ in 0..20 {
            assert!(strategy.next_backoff().is_some());
            assert!(!strategy.is_exhausted());
        }
    }

    #[test]
    fn test_retry_sleeps_through_clock() {
        let clock = ManualClock::new(0);
        let mut strategy = RetryStrategy::constant(10, 3);
        let mut calls = 0;
        let result: Result<u32, TransportError> = retry_with_backoff(
            || {
                calls += 1;
                if calls < 3 {
                    Err(TransportError::Busy)
                } else {
                    Ok(calls)
                }
            },
            &mut strategy,
            &clock,
            "send",
        );
        assert_eq!(result, Ok(3));
        assert_eq!(clock.sleeps(), 2);
        assert_eq!(strategy.attempt_number(), 0);
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let clock = ManualClock::new(0);
        let mut strategy = RetryStrategy::constant(10, 3);
        let mut calls = 0;
        let result: Result<(), TransportError> = retry_with_backoff(
            || {
                calls += 1;
                Err(TransportError::Service(-5))
            },
            &mut strategy,
            &clock,
            "send",
        );
        assert_eq!(result, Err(TransportError::Service(-5)));
        assert_eq!(calls, 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_exhausted_retries_keep_count() {
        let clock = ManualClock::new(0);
        let mut strategy = RetryStrategy::constant(10, 2);
        let result: Result<(), TransportError> =
            retry_with_backoff(|| Err(TransportError::Timeout), &mut strategy, &clock, "send");
        assert_eq!(result, Err(TransportError::Timeout));
        assert_eq!(strategy.attempt_number(), 2);
    }
}
