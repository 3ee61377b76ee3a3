// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulated platform
//!
//! Deterministic stand-ins for the host clock, counter register, wake-lock
//! and restart primitives. Used by the host simulator binary and by tests
//! across the workspace.

use crate::{CounterSource, HostClock, PlatformServices, RestartTrigger, Result, WakeLockBackend};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Host clock that only moves when told to; `sleep` advances it instantly
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
    sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
            sleeps: AtomicUsize::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time, including backwards
    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    /// Number of `sleep` calls observed
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl HostClock for ManualClock {
    fn elapsed_realtime_nanos(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}

/// Counter derived from a [`ManualClock`] with a configurable skew
///
/// `ticks = (host_ns - skew_ns) * frequency / 1e9 + reads * jitter_ticks`,
/// so the true host-minus-counter offset is `skew_ns` and every read
/// drifts by `jitter_ticks`.
#[derive(Debug)]
pub struct LinkedCounter {
    clock: Arc<ManualClock>,
    frequency_hz: u64,
    skew_ns: AtomicI64,
    jitter_ticks: AtomicU64,
    reads: AtomicU64,
}

impl LinkedCounter {
    pub fn new(clock: Arc<ManualClock>, frequency_hz: u64, skew_ns: i64) -> Self {
        Self {
            clock,
            frequency_hz,
            skew_ns: AtomicI64::new(skew_ns),
            jitter_ticks: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }

    pub fn set_skew(&self, skew_ns: i64) {
        self.skew_ns.store(skew_ns, Ordering::SeqCst);
    }

    pub fn set_jitter_ticks(&self, ticks: u64) {
        self.jitter_ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CounterSource for LinkedCounter {
    fn read_counter_ticks(&self) -> u64 {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        let host = self.clock.elapsed_realtime_nanos() as i128;
        let counter_ns = (host - self.skew_ns.load(Ordering::SeqCst) as i128).max(0);
        let ticks = counter_ns * self.frequency_hz as i128 / 1_000_000_000;
        ticks as u64 + n * self.jitter_ticks.load(Ordering::SeqCst)
    }

    fn counter_frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}

/// One backend transition seen by [`RecordingWakeLock`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeLockEvent {
    Acquired(String),
    Released(String),
}

/// Wake-lock backend that records transitions instead of touching the kernel
#[derive(Debug, Default)]
pub struct RecordingWakeLock {
    held: Mutex<AHashMap<String, bool>>,
    events: Mutex<Vec<WakeLockEvent>>,
}

impl RecordingWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().get(name).copied().unwrap_or(false)
    }

    pub fn events(&self) -> Vec<WakeLockEvent> {
        self.events.lock().clone()
    }
}

impl WakeLockBackend for RecordingWakeLock {
    fn acquire(&self, name: &str) -> Result<()> {
        self.held.lock().insert(name.to_string(), true);
        self.events
            .lock()
            .push(WakeLockEvent::Acquired(name.to_string()));
        Ok(())
    }

    fn release(&self, name: &str) -> Result<()> {
        self.held.lock().insert(name.to_string(), false);
        self.events
            .lock()
            .push(WakeLockEvent::Released(name.to_string()));
        Ok(())
    }
}

/// Restart trigger that counts requests
#[derive(Debug, Default)]
pub struct RecordingRestartTrigger {
    reasons: Mutex<Vec<String>>,
}

impl RecordingRestartTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.reasons.lock().len()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl RestartTrigger for RecordingRestartTrigger {
    fn trigger_restart(&self, reason: &str) -> Result<()> {
        self.reasons.lock().push(reason.to_string());
        Ok(())
    }
}

/// Simulated platform with handles kept for inspection
pub struct SimPlatform {
    pub clock: Arc<ManualClock>,
    pub counter: Arc<LinkedCounter>,
    pub wake_lock: Arc<RecordingWakeLock>,
    pub restart: Arc<RecordingRestartTrigger>,
}

impl SimPlatform {
    /// Counter at `frequency_hz`, host time starting at `start_ns`, skewed by `skew_ns`
    pub fn new(start_ns: u64, frequency_hz: u64, skew_ns: i64) -> Self {
        let clock = Arc::new(ManualClock::new(start_ns));
        let counter = Arc::new(LinkedCounter::new(Arc::clone(&clock), frequency_hz, skew_ns));
        Self {
            clock,
            counter,
            wake_lock: Arc::new(RecordingWakeLock::new()),
            restart: Arc::new(RecordingRestartTrigger::new()),
        }
    }

    pub fn services(&self) -> PlatformServices {
        PlatformServices {
            counter: self.counter.clone(),
            clock: self.clock.clone(),
            wake_lock: self.wake_lock.clone(),
            restart: self.restart.clone(),
        }
    }
}
