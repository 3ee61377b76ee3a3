// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outstanding-request watchdog
//!
//! Armed when a request goes out, disarmed when its response arrives. If
//! the deadline passes with requests still outstanding the transport is
//! considered wedged and `on_expire` runs once.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub type ExpireHandler = Box<dyn Fn() + Send + Sync + 'static>;

#[derive(Default)]
struct WatchdogState {
    outstanding: usize,
    deadline: Option<Instant>,
    stopping: bool,
    expirations: usize,
}

struct WatchdogShared {
    state: Mutex<WatchdogState>,
    changed: Condvar,
}

pub struct RequestWatchdog {
    name: String,
    timeout: Duration,
    shared: Arc<WatchdogShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RequestWatchdog {
    pub fn start(
        name: impl Into<String>,
        timeout: Duration,
        on_expire: ExpireHandler,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let shared = Arc::new(WatchdogShared {
            state: Mutex::new(WatchdogState::default()),
            changed: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("{}_wdog", name))
            .spawn(move || run_watchdog(&worker_shared, &worker_name, on_expire))?;

        debug!("[WATCHDOG] {} started ({:?})", name, timeout);
        Ok(Self {
            name,
            timeout,
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Note one more outstanding request
    pub fn arm(&self) {
        let mut state = self.shared.state.lock();
        state.outstanding += 1;
        if state.deadline.is_none() {
            state.deadline = Some(Instant::now() + self.timeout);
        }
        drop(state);
        self.shared.changed.notify_one();
    }

    /// Note one response; progress pushes the deadline out
    pub fn disarm(&self) {
        let mut state = self.shared.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.deadline = if state.outstanding == 0 {
            None
        } else {
            Some(Instant::now() + self.timeout)
        };
        drop(state);
        self.shared.changed.notify_one();
    }

    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    pub fn expirations(&self) -> usize {
        self.shared.state.lock().expirations
    }

    pub fn stop(&self) {
        self.shared.state.lock().stopping = true;
        self.shared.changed.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                error!("[WATCHDOG] {} join error: {:?}", self.name, e);
            }
        }
    }
}

impl Drop for RequestWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_watchdog(shared: &WatchdogShared, name: &str, on_expire: ExpireHandler) {
    let mut state = shared.state.lock();
    loop {
        if state.stopping {
            break;
        }
        match state.deadline {
            None => shared.changed.wait(&mut state),
            Some(deadline) if Instant::now() >= deadline => {
                error!(
                    "[WATCHDOG] {}: {} request(s) unanswered past deadline",
                    name, state.outstanding
                );
                state.deadline = None;
                state.outstanding = 0;
                state.expirations += 1;
                drop(state);
                on_expire();
                state = shared.state.lock();
            }
            Some(deadline) => {
                shared.changed.wait_until(&mut state, deadline);
            }
        }
    }
}
