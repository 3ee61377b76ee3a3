// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection to the coprocessor's client-manager service
//!
//! # Lifecycle
//! ```text
//! Connecting -> Open -> Closing -> Closed
//!                 |                  ^
//!                 v                  |
//!           ErrorDetected -> Disconnected -> Reconnecting -> Open
//!                                                 |
//!                                                 v
//!                                              Failed
//! ```
//! A transport error never reconnects inline: it schedules one reconnect
//! task on the connection's own executor, behind every indication that was
//! already queued. Further errors while that task is pending are absorbed.

use crate::discovery::ServiceAccessLatch;
use crate::error::{ConnectionError, Result, TransportError};
use crate::governor::RestartGovernor;
use crate::retry::{retry_with_backoff, RetryStrategy};
use crate::transport::{ChannelHandle, MessageId, Transport, TransportHandlers};
use crate::watchdog::RequestWatchdog;
use parking_lot::{Mutex, RwLock};
use sensorhub_config::ConnectionConfig;
use sensorhub_executor::{TaskExecutor, WakeLock, WakeLockRegistry};
use sensorhub_hal::{HostClock, PlatformServices};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Process-wide collaborators shared by every connection
pub struct ConnectionContext {
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn HostClock>,
    pub governor: Arc<RestartGovernor>,
    pub wake_locks: Arc<WakeLockRegistry>,
    pub access: Arc<ServiceAccessLatch>,
    pub config: ConnectionConfig,
}

impl ConnectionContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        platform: &PlatformServices,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            clock: Arc::clone(&platform.clock),
            governor: Arc::new(RestartGovernor::new(
                Arc::clone(&platform.restart),
                Arc::clone(&platform.clock),
                &config,
            )),
            wake_locks: Arc::new(WakeLockRegistry::new(Arc::clone(&platform.wake_lock))),
            access: Arc::new(ServiceAccessLatch::new()),
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    ErrorDetected,
    Disconnected,
    Reconnecting,
    /// Reopen after an error failed; no further automatic attempts
    Failed,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (Closing, Closed) => true,
            (Closing, _) => false,
            (_, Closing) => true,
            (Connecting, Open | Failed) => true,
            (Open, ErrorDetected) => true,
            (ErrorDetected, Disconnected) => true,
            (Disconnected, Reconnecting) => true,
            (Reconnecting, Open | Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Closed)
    }
}

/// Notifications delivered through the error callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The channel was reopened after a transport error; state on the
    /// coprocessor side is gone and must be re-established
    ConnectionReset,
    /// Reopening failed; the connection stays down
    ReconnectFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Sync,
    Async,
}

/// One inbound report as seen by the owner
#[derive(Debug, Clone, Copy)]
pub struct Indication<'a> {
    pub payload: &'a [u8],
    /// Host clock when the transport handed the report over
    pub received_at_ns: u64,
}

pub type IndicationCallback = Arc<dyn Fn(Indication<'_>) + Send + Sync>;
pub type ResponseCallback = Arc<dyn Fn(std::result::Result<(), TransportError>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

#[derive(Clone)]
pub struct ConnectionOptions {
    /// Also the executor thread name
    pub name: String,
    /// Deliver indications on the transport thread instead of the executor
    pub realtime: bool,
    /// Wake lock held while indications are queued
    pub wake_lock: Option<Arc<WakeLock>>,
}

impl ConnectionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            realtime: false,
            wake_lock: None,
        }
    }
}

struct Channel {
    state: ConnectionState,
    handle: Option<ChannelHandle>,
}

impl Channel {
    fn transition(&mut self, name: &str, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(
                "[CONNECTION] {} ignoring transition {:?} -> {:?}",
                name, self.state, next
            );
            return false;
        }
        debug!("[CONNECTION] {} {:?} -> {:?}", name, self.state, next);
        self.state = next;
        true
    }
}

struct Inner {
    name: String,
    ctx: Arc<ConnectionContext>,
    executor: TaskExecutor,
    channel: Mutex<Channel>,
    reconnecting: AtomicBool,
    on_indication: IndicationCallback,
    on_response: RwLock<Option<ResponseCallback>>,
    on_error: RwLock<Option<ErrorCallback>>,
    watchdog: Option<RequestWatchdog>,
    realtime: bool,
    last_indication_ns: AtomicU64,
    reconnects: AtomicUsize,
}

/// An open channel owned by exactly one session
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Discover the service, start the executor, and open the channel
    pub fn open(
        ctx: Arc<ConnectionContext>,
        options: ConnectionOptions,
        on_indication: IndicationCallback,
    ) -> Result<Self> {
        let executor = TaskExecutor::new(options.name.clone());
        if let Some(lock) = options.wake_lock {
            executor.attach_wake_lock(lock)?;
        }
        executor.start()?;

        let watchdog = if ctx.config.watchdog_enabled {
            let governor = Arc::clone(&ctx.governor);
            let name = options.name.clone();
            Some(RequestWatchdog::start(
                options.name.clone(),
                ctx.config.watchdog_deadline(),
                Box::new(move || {
                    governor.request_restart(&format!("{}: request watchdog expired", name));
                }),
            )?)
        } else {
            None
        };

        let inner = Arc::new(Inner {
            name: options.name,
            ctx,
            executor,
            channel: Mutex::new(Channel {
                state: ConnectionState::Connecting,
                handle: None,
            }),
            reconnecting: AtomicBool::new(false),
            on_indication,
            on_response: RwLock::new(None),
            on_error: RwLock::new(None),
            watchdog,
            realtime: options.realtime,
            last_indication_ns: AtomicU64::new(0),
            reconnects: AtomicUsize::new(0),
        });

        match inner.establish() {
            Ok(handle) => {
                let mut channel = inner.channel.lock();
                channel.handle = Some(handle);
                channel.transition(&inner.name, ConnectionState::Open);
            }
            Err(e) => {
                error!("[CONNECTION] {} open failed: {}", inner.name, e);
                inner.channel.lock().transition(&inner.name, ConnectionState::Failed);
                inner.shutdown();
                return Err(e);
            }
        }

        info!(
            "[CONNECTION] {} open{}",
            inner.name,
            if inner.realtime { " (realtime delivery)" } else { "" }
        );
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.channel.lock().state
    }

    pub fn handle(&self) -> Option<ChannelHandle> {
        self.inner.channel.lock().handle
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::SeqCst)
    }

    /// Successful reopens since the connection was created
    pub fn reconnect_count(&self) -> usize {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Indications and reconnect tasks not yet run
    pub fn pending_tasks(&self) -> usize {
        self.inner.executor.pending()
    }

    pub fn register_response_callback(&self, callback: ResponseCallback) -> Result<()> {
        let mut slot = self.inner.on_response.write();
        if slot.is_some() {
            return Err(ConnectionError::InvalidArgument(
                "response callback already registered".to_string(),
            ));
        }
        *slot = Some(callback);
        Ok(())
    }

    pub fn register_error_callback(&self, callback: ErrorCallback) -> Result<()> {
        let mut slot = self.inner.on_error.write();
        if slot.is_some() {
            return Err(ConnectionError::InvalidArgument(
                "error callback already registered".to_string(),
            ));
        }
        *slot = Some(callback);
        Ok(())
    }

    /// Send one request frame
    ///
    /// While a reconnect is pending the request is dropped and `Ok(())` is
    /// returned; the owner re-issues its configuration on `ConnectionReset`.
    pub fn send_request(&self, payload: &[u8], mode: SendMode) -> Result<()> {
        self.inner.send_request(payload, mode)
    }

    /// Stop delivery and release the channel
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("reconnecting", &self.is_reconnecting())
            .finish()
    }
}

impl Inner {
    /// Wait for the service within the current budget, then open a channel
    fn establish(self: &Arc<Self>) -> Result<ChannelHandle> {
        self.wait_for_service()?;
        let handle = self.ctx.transport.open(self.handlers())?;
        self.ctx.access.mark_accessed();
        Ok(handle)
    }

    fn wait_for_service(&self) -> Result<()> {
        let (attempts, timeout) = self.ctx.access.budget(&self.ctx.config);
        for attempt in 1..=attempts {
            match self.ctx.transport.wait_for_service(timeout) {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            "[CONNECTION] {} service found on attempt {}",
                            self.name, attempt
                        );
                    }
                    return Ok(());
                }
                Err(e) => warn!(
                    "[CONNECTION] {} service not ready (attempt {}/{}): {}",
                    self.name, attempt, attempts, e
                ),
            }
        }
        Err(ConnectionError::ServiceUnavailable { attempts })
    }

    fn handlers(self: &Arc<Self>) -> TransportHandlers {
        let on_indication = Arc::downgrade(self);
        let on_error = Arc::downgrade(self);
        TransportHandlers {
            on_indication: Arc::new(move |msg_id, payload| {
                if let Some(inner) = on_indication.upgrade() {
                    inner.handle_indication(msg_id, payload);
                }
            }),
            on_error: Arc::new(move |err| {
                if let Some(inner) = on_error.upgrade() {
                    inner.handle_transport_error(err);
                }
            }),
        }
    }

    fn is_closing(&self) -> bool {
        self.channel.lock().state.is_terminal()
    }

    fn handle_indication(self: &Arc<Self>, msg_id: MessageId, payload: Vec<u8>) {
        if !msg_id.is_report() {
            warn!(
                "[CONNECTION] {} dropping indication with id {:?}",
                self.name, msg_id
            );
            return;
        }
        if self.is_closing() {
            return;
        }

        let received_at_ns = self.ctx.clock.elapsed_realtime_nanos();
        self.trace_gap(received_at_ns);

        if self.realtime {
            self.deliver(&payload, received_at_ns);
            return;
        }

        let weak = Arc::downgrade(self);
        let submitted = self.executor.submit(Some(Box::new(payload)), move |bytes| {
            if let Some(inner) = weak.upgrade() {
                inner.deliver(bytes.unwrap_or_default(), received_at_ns);
            }
        });
        if let Err(e) = submitted {
            debug!("[CONNECTION] {} indication dropped: {}", self.name, e);
        }
    }

    fn deliver(&self, payload: &[u8], received_at_ns: u64) {
        if self.is_closing() {
            return;
        }
        (self.on_indication)(Indication {
            payload,
            received_at_ns,
        });
    }

    fn trace_gap(&self, now_ns: u64) {
        let threshold_ms = self.ctx.config.indication_jitter_log_ms;
        if threshold_ms == 0 {
            return;
        }
        let previous = self.last_indication_ns.swap(now_ns, Ordering::Relaxed);
        let gap_ns = now_ns.saturating_sub(previous);
        if previous != 0 && gap_ns > threshold_ms.saturating_mul(1_000_000) {
            info!(
                "[CONNECTION] {} indication gap {} ms",
                self.name,
                gap_ns / 1_000_000
            );
        }
    }

    fn handle_transport_error(self: &Arc<Self>, err: TransportError) {
        if self.is_closing() {
            debug!("[CONNECTION] {} error while closing: {}", self.name, err);
            return;
        }
        warn!("[CONNECTION] {} transport error: {}", self.name, err);
        self.ctx.access.clear();

        if self.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("[RECONNECT] {} reconnect already pending", self.name);
            return;
        }
        if !self
            .channel
            .lock()
            .transition(&self.name, ConnectionState::ErrorDetected)
        {
            self.reconnecting.store(false, Ordering::SeqCst);
            return;
        }

        let weak = Arc::downgrade(self);
        let scheduled = self.executor.submit(None, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.reconnect();
            }
        });
        if let Err(e) = scheduled {
            warn!("[RECONNECT] {} could not schedule reconnect: {}", self.name, e);
            self.reconnecting.store(false, Ordering::SeqCst);
        }
    }

    fn reconnect(self: &Arc<Self>) {
        let stale = {
            let mut channel = self.channel.lock();
            if !channel.transition(&self.name, ConnectionState::Disconnected) {
                self.reconnecting.store(false, Ordering::SeqCst);
                return;
            }
            channel.handle.take()
        };
        if let Some(handle) = stale {
            self.ctx.transport.close(handle);
        }
        if !self
            .channel
            .lock()
            .transition(&self.name, ConnectionState::Reconnecting)
        {
            self.reconnecting.store(false, Ordering::SeqCst);
            return;
        }

        info!("[RECONNECT] {} reopening channel", self.name);
        match self.establish() {
            Ok(handle) => {
                let mut channel = self.channel.lock();
                if !channel.transition(&self.name, ConnectionState::Open) {
                    drop(channel);
                    self.ctx.transport.close(handle);
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                channel.handle = Some(handle);
                drop(channel);

                self.reconnecting.store(false, Ordering::SeqCst);
                self.reconnects.fetch_add(1, Ordering::SeqCst);
                info!("[RECONNECT] {} channel restored", self.name);
                self.notify(ConnectionEvent::ConnectionReset);
            }
            Err(e) => {
                error!("[RECONNECT] {} reopen failed, giving up: {}", self.name, e);
                self.channel
                    .lock()
                    .transition(&self.name, ConnectionState::Failed);
                self.reconnecting.store(false, Ordering::SeqCst);
                self.notify(ConnectionEvent::ReconnectFailed);
            }
        }
    }

    fn notify(&self, event: ConnectionEvent) {
        let callback = self.on_error.read().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn respond(&self, result: std::result::Result<(), TransportError>) {
        let callback = self.on_response.read().clone();
        if let Some(callback) = callback {
            callback(result);
        }
    }

    fn send_request(self: &Arc<Self>, payload: &[u8], mode: SendMode) -> Result<()> {
        let max = self.ctx.config.max_request_len;
        if payload.is_empty() {
            return Err(ConnectionError::InvalidArgument("empty request".to_string()));
        }
        if payload.len() > max {
            return Err(ConnectionError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }
        if self.reconnecting.load(Ordering::SeqCst) {
            warn!(
                "[CONNECTION] {} reconnecting, dropping {} byte request",
                self.name,
                payload.len()
            );
            return Ok(());
        }

        let handle = {
            let channel = self.channel.lock();
            match (channel.state, channel.handle) {
                (ConnectionState::Open, Some(handle)) => handle,
                (state, _) if state.is_terminal() => return Err(ConnectionError::Closed),
                _ => return Err(ConnectionError::NotConnected),
            }
        };

        let config = &self.ctx.config;
        let mut strategy =
            RetryStrategy::constant(config.send_retry_backoff_ms, config.send_retry_attempts);
        let result = match mode {
            SendMode::Sync => retry_with_backoff(
                || self.send_sync_once(handle, payload),
                &mut strategy,
                self.ctx.clock.as_ref(),
                &self.name,
            ),
            SendMode::Async => retry_with_backoff(
                || self.send_async_once(handle, payload),
                &mut strategy,
                self.ctx.clock.as_ref(),
                &self.name,
            ),
        };

        match result {
            Ok(()) => {
                self.ctx.governor.record_success();
                if mode == SendMode::Sync {
                    self.respond(Ok(()));
                }
                Ok(())
            }
            Err(last) => {
                let attempts = strategy.attempt_number() + 1;
                error!(
                    "[CONNECTION] {} send failed after {} attempts: {}",
                    self.name, attempts, last
                );
                self.ctx
                    .governor
                    .record_failure(&format!("{}: {}", self.name, last));
                if mode == SendMode::Sync {
                    self.respond(Err(last.clone()));
                }
                Err(ConnectionError::SendFailed { attempts, last })
            }
        }
    }

    fn send_sync_once(
        &self,
        handle: ChannelHandle,
        payload: &[u8],
    ) -> std::result::Result<(), TransportError> {
        if let Some(watchdog) = &self.watchdog {
            watchdog.arm();
        }
        let result = self.ctx.transport.send_sync(
            handle,
            payload,
            self.ctx.config.response_timeout(),
        );
        if let Some(watchdog) = &self.watchdog {
            watchdog.disarm();
        }
        result
    }

    fn send_async_once(
        self: &Arc<Self>,
        handle: ChannelHandle,
        payload: &[u8],
    ) -> std::result::Result<(), TransportError> {
        if let Some(watchdog) = &self.watchdog {
            watchdog.arm();
        }
        let weak = Arc::downgrade(self);
        let result = self.ctx.transport.send_async(
            handle,
            payload.to_vec(),
            Box::new(move |result| {
                if let Some(inner) = weak.upgrade() {
                    if let Some(watchdog) = &inner.watchdog {
                        watchdog.disarm();
                    }
                    inner.respond(result);
                }
            }),
        );
        if result.is_err() {
            if let Some(watchdog) = &self.watchdog {
                watchdog.disarm();
            }
        }
        result
    }

    fn close(&self) {
        let handle = {
            let mut channel = self.channel.lock();
            if !channel.transition(&self.name, ConnectionState::Closing) {
                return;
            }
            channel.handle.take()
        };
        info!("[CONNECTION] {} closing", self.name);
        if let Some(handle) = handle {
            self.ctx.transport.close(handle);
        }
        self.shutdown();
        self.channel
            .lock()
            .transition(&self.name, ConnectionState::Closed);
    }

    fn shutdown(&self) {
        let dropped = self.executor.stop();
        if dropped > 0 {
            debug!(
                "[CONNECTION] {} discarded {} undelivered tasks",
                self.name, dropped
            );
        }
        if let Some(watchdog) = &self.watchdog {
            watchdog.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;
        assert!(Connecting.can_transition_to(Open));
        assert!(Open.can_transition_to(ErrorDetected));
        assert!(ErrorDetected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Open));
        assert!(Reconnecting.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));

        assert!(!Open.can_transition_to(Reconnecting));
        assert!(!Failed.can_transition_to(Open));
        assert!(!Closing.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Closing));
    }
}
