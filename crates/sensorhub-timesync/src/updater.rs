// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodic offset refresh
//!
//! Sessions only refresh the offset lazily when they translate a sample, so
//! an idle host would otherwise carry a stale offset into its next sample.
//! The updater forces a refresh every interval and tells a listener when the
//! offset moved.

use crate::error::{Result, TimeSyncError};
use crate::translator::ClockTranslator;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Called with the new offset after every refresh that changed it
pub type OffsetListener = Box<dyn Fn(i64) + Send + 'static>;

/// Background thread that keeps a [`ClockTranslator`] fresh
pub struct OffsetUpdater {
    translator: Arc<ClockTranslator>,
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl OffsetUpdater {
    /// Updater running at the translator's configured refresh interval
    pub fn new(translator: Arc<ClockTranslator>) -> Self {
        let interval = translator.refresh_interval();
        Self::with_interval(translator, interval)
    }

    pub fn with_interval(translator: Arc<ClockTranslator>, interval: Duration) -> Self {
        Self {
            translator,
            interval,
            stop_tx: None,
            thread_handle: None,
        }
    }

    /// Start refreshing; the translator must already be initialized
    pub fn start(&mut self, listener: Option<OffsetListener>) -> Result<()> {
        if self.thread_handle.is_some() {
            return Err(TimeSyncError::AlreadyRunning);
        }
        if !self.translator.is_initialized() {
            return Err(TimeSyncError::NotInitialized);
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let translator = Arc::clone(&self.translator);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("sensorhub_offset".to_string())
            .spawn(move || {
                info!("[TIMESYNC] offset updater started (every {:?})", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if translator.recalculate_offset(true) {
                        let offset = translator.offset();
                        debug!("[TIMESYNC] periodic refresh moved offset to {} ns", offset);
                        if let Some(listener) = &listener {
                            listener(offset);
                        }
                    }
                }
                info!("[TIMESYNC] offset updater stopped");
            })?;

        self.stop_tx = Some(stop_tx);
        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                error!("[TIMESYNC] offset updater join error: {:?}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }
}

impl Drop for OffsetUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}
