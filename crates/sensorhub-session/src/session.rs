// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sensor session
//!
//! # States
//! ```text
//! Inactive -> Activating -> Active -> Deactivating -> Inactive
//! ```
//! A coprocessor reset overlays `Active` with a recovering flag while the
//! service identifier is re-confirmed and the stream configuration resent.
//!
//! # Locking
//! `control` guards state and connections; `data` guards the bias list and
//! is shared by the primary and calibration executors. `control` is always
//! taken before `data`, and no lock is held while a connection is closed.

use crate::batching::compute_batching;
use crate::bias::BiasList;
use crate::codec::{ConfigRequest, DecodedEvent, EventKind, JsonCodec, MessageCodec, RequestKind};
use crate::error::{Result, SessionError};
use crate::stats::{SessionStats, StatsReport};
use crate::types::{
    CalibrationBias, CalibrationSource, DeliveryType, QualityStatus, ReportingMode, SampleSink,
    SensorEvent, SensorInfo, SensorParams, SensorSample, MAX_SAMPLE_VALUES,
};
use parking_lot::Mutex;
use sensorhub_config::SessionConfig;
use sensorhub_connection::{
    discover_blocking, ChannelHandle, Connection, ConnectionContext, ConnectionEvent,
    ConnectionOptions, Indication, SendMode, ServiceDiscovery,
};
use sensorhub_executor::{TaskExecutor, WakeLock};
use sensorhub_timesync::ClockTranslator;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Wake lock shared by every wake-up sensor
pub const WAKEUP_LOCK_NAME: &str = "sensorhub_wakeup";

/// Collaborators shared by every session in the process
pub struct SessionContext {
    pub connections: Arc<ConnectionContext>,
    pub discovery: Arc<dyn ServiceDiscovery>,
    pub clock: Arc<ClockTranslator>,
    pub codec: Arc<dyn MessageCodec>,
    pub config: SessionConfig,
}

impl SessionContext {
    /// Context using [`JsonCodec`]
    pub fn new(
        connections: Arc<ConnectionContext>,
        discovery: Arc<dyn ServiceDiscovery>,
        clock: Arc<ClockTranslator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            connections,
            discovery,
            clock,
            codec: Arc::new(JsonCodec::new()),
            config,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

/// Everything released when a session goes down
#[derive(Default)]
struct Resources {
    primary: Option<Arc<Connection>>,
    calibration: Option<Arc<Connection>>,
    reissue: Option<Arc<TaskExecutor>>,
}

impl Resources {
    /// Stop the reissue worker, then close primary before calibration
    fn release(self, name: &str) {
        if let Some(worker) = self.reissue {
            worker.stop();
        }
        if let Some(primary) = self.primary {
            primary.close();
        }
        if let Some(calibration) = self.calibration {
            calibration.close();
        }
        debug!("[SESSION] {} connections released", name);
    }
}

struct Control {
    state: SessionState,
    params: SensorParams,
    resources: Resources,
}

struct DataState {
    biases: BiasList,
    /// Previous emitted sample, for on-change duplicate suppression
    last_emitted: Option<SensorSample>,
    bias_reliable: bool,
    accepting: bool,
}

struct SessionInner {
    name: String,
    info: SensorInfo,
    ctx: Arc<SessionContext>,
    sink: Arc<dyn SampleSink>,
    control: Mutex<Control>,
    data: Mutex<DataState>,
    stats: Mutex<SessionStats>,
    pending_flush: AtomicU32,
    /// Set by a reset; the next activation re-runs discovery first
    reset_requested: AtomicBool,
    recovering: AtomicBool,
    wake_lock: Option<Arc<WakeLock>>,
}

/// One logical sensor: primary stream plus optional calibration stream
pub struct SensorSession {
    inner: Arc<SessionInner>,
}

impl SensorSession {
    pub fn new(ctx: Arc<SessionContext>, info: SensorInfo, sink: Arc<dyn SampleSink>) -> Self {
        let wake_lock = info
            .wakeup
            .then(|| ctx.connections.wake_locks.get(WAKEUP_LOCK_NAME));
        let name = if info.wakeup {
            format!("{}(wakeup)", info.name)
        } else {
            info.name.clone()
        };
        let capacity = ctx.config.bias_list_capacity;
        Self {
            inner: Arc::new(SessionInner {
                name,
                info,
                ctx,
                sink,
                control: Mutex::new(Control {
                    state: SessionState::Inactive,
                    params: SensorParams::default(),
                    resources: Resources::default(),
                }),
                data: Mutex::new(DataState {
                    biases: BiasList::new(capacity),
                    last_emitted: None,
                    bias_reliable: false,
                    accepting: false,
                }),
                stats: Mutex::new(SessionStats::default()),
                pending_flush: AtomicU32::new(0),
                reset_requested: AtomicBool::new(false),
                recovering: AtomicBool::new(false),
                wake_lock,
            }),
        }
    }

    pub fn info(&self) -> &SensorInfo {
        &self.inner.info
    }

    pub fn state(&self) -> SessionState {
        self.inner.control.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// A reset is being handled
    pub fn is_recovering(&self) -> bool {
        self.inner.recovering.load(Ordering::SeqCst)
    }

    pub fn params(&self) -> SensorParams {
        self.inner.control.lock().params
    }

    pub fn bias_count(&self) -> usize {
        self.inner.data.lock().biases.len()
    }

    pub fn pending_flushes(&self) -> u32 {
        self.inner.pending_flush.load(Ordering::SeqCst)
    }

    /// (primary, calibration) transport handles while active
    pub fn channel_handles(&self) -> (Option<ChannelHandle>, Option<ChannelHandle>) {
        let control = self.inner.control.lock();
        (
            control.resources.primary.as_ref().and_then(|c| c.handle()),
            control.resources.calibration.as_ref().and_then(|c| c.handle()),
        )
    }

    pub fn stats(&self) -> StatsReport {
        let now = self.inner.ctx.connections.clock.elapsed_realtime_nanos();
        self.inner.stats.lock().report(now)
    }

    /// Open the connections and configure both streams
    pub fn activate(&self) -> Result<()> {
        self.inner.activate()
    }

    pub fn deactivate(&self) -> Result<()> {
        self.inner.deactivate()
    }

    /// Store new rate/latency and resend the stream configuration if active
    pub fn set_config(&self, params: SensorParams) -> Result<()> {
        self.inner.set_config(params)
    }

    /// Ask the coprocessor to drain buffered samples
    ///
    /// A flush on an inactive session is a no-op.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

impl Drop for SensorSession {
    fn drop(&mut self) {
        if let Err(e) = self.inner.deactivate() {
            warn!("[SESSION] {} deactivate on drop: {}", self.inner.name, e);
        }
    }
}

impl std::fmt::Debug for SensorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

/// One wake-lock reference held for the lifetime of the guard
struct WakeHold<'a>(&'a WakeLock);

impl<'a> WakeHold<'a> {
    fn new(lock: &'a WakeLock) -> Self {
        lock.get_n_locks(1);
        Self(lock)
    }
}

impl Drop for WakeHold<'_> {
    fn drop(&mut self) {
        self.0.put_n_locks(1);
    }
}

impl SessionInner {
    fn validate(&self, params: &SensorParams) -> Result<()> {
        if self.info.reporting_mode == ReportingMode::Continuous && params.sample_period_ns == 0 {
            return Err(SessionError::InvalidArgument(format!(
                "{}: sample period must be non-zero",
                self.name
            )));
        }
        Ok(())
    }

    fn activate(self: &Arc<Self>) -> Result<()> {
        let mut control = self.control.lock();
        match control.state {
            SessionState::Active => return Ok(()),
            SessionState::Activating | SessionState::Deactivating => {
                return Err(SessionError::Busy(self.name.clone()))
            }
            SessionState::Inactive => {}
        }
        self.validate(&control.params)?;
        control.state = SessionState::Activating;

        match self.bring_up(&mut control) {
            Ok(()) => {
                control.state = SessionState::Active;
                info!("[SESSION] {} active", self.name);
                Ok(())
            }
            Err(e) => {
                error!("[SESSION] {} activation failed: {}", self.name, e);
                self.data.lock().accepting = false;
                let resources = std::mem::take(&mut control.resources);
                control.state = SessionState::Inactive;
                drop(control);
                resources.release(&self.name);
                Err(e)
            }
        }
    }

    fn bring_up(self: &Arc<Self>, control: &mut Control) -> Result<()> {
        if self.reset_requested.load(Ordering::SeqCst) {
            self.rediscover(|| true)?;
        }

        {
            let mut data = self.data.lock();
            data.biases.clear();
            data.last_emitted = None;
            data.bias_reliable = false;
            data.accepting = true;
        }
        self.pending_flush.store(0, Ordering::SeqCst);
        let now = self.ctx.connections.clock.elapsed_realtime_nanos();
        self.stats.lock().begin(now);

        let primary = self.open_primary()?;
        control.resources.primary = Some(Arc::clone(&primary));

        if let Some(source) = &self.info.calibration {
            let calibration = self.open_calibration(source)?;
            control.resources.calibration = Some(Arc::clone(&calibration));

            let connection_config = &self.ctx.connections.config;
            if connection_config.realtime_delivery && self.ctx.config.low_latency_bias_reissue {
                let worker = Arc::new(TaskExecutor::new(format!(
                    "see_cal_reissue_{}",
                    self.info.handle
                )));
                worker.start()?;
                control.resources.reissue = Some(worker);
            }
            self.send_calibration_config(&calibration, DeliveryType::Wakeup, SendMode::Sync)?;
        }

        self.send_stream_config(&primary, &control.params)
    }

    fn open_primary(self: &Arc<Self>) -> Result<Arc<Connection>> {
        let mut options = ConnectionOptions::named(format!("see_{}", self.info.handle));
        options.realtime = self.ctx.connections.config.realtime_delivery;
        options.wake_lock = self.wake_lock.clone();

        let weak = Arc::downgrade(self);
        let connection = Connection::open(
            Arc::clone(&self.ctx.connections),
            options,
            Arc::new(move |indication: Indication<'_>| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_data(indication);
                }
            }),
        )?;

        let weak = Arc::downgrade(self);
        connection.register_error_callback(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_primary_event(event);
            }
        }))?;
        Ok(Arc::new(connection))
    }

    fn open_calibration(self: &Arc<Self>, source: &CalibrationSource) -> Result<Arc<Connection>> {
        let mut options = ConnectionOptions::named(format!("see_cal_{}", self.info.handle));
        options.realtime = self.ctx.connections.config.realtime_delivery;

        let weak = Arc::downgrade(self);
        let connection = Connection::open(
            Arc::clone(&self.ctx.connections),
            options,
            Arc::new(move |indication: Indication<'_>| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_calibration(indication);
                }
            }),
        )?;

        let weak = Arc::downgrade(self);
        connection.register_error_callback(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_calibration_event(event);
            }
        }))?;
        debug!(
            "[SESSION] {} calibration source {} ({})",
            self.name, source.data_type, source.service_id
        );
        Ok(Arc::new(connection))
    }

    fn stream_request(&self, params: &SensorParams) -> ConfigRequest {
        let batching = compute_batching(&self.info, params, self.ctx.config.fifo_max_event_count);
        let rate_hz = if params.sample_period_ns == 0 {
            0.0
        } else {
            (1e9 / params.sample_period_ns as f64) as f32
        };
        let continuous = self.info.reporting_mode == ReportingMode::Continuous;

        let (target, kind) = match self.info.resampler {
            Some(resampler) if continuous => (
                resampler,
                RequestKind::ResamplerConfig {
                    sensor: self.info.service_id,
                    rate_hz,
                    filter: true,
                },
            ),
            _ if continuous => (
                self.info.service_id,
                RequestKind::StreamConfig {
                    sample_rate_hz: rate_hz,
                },
            ),
            _ => (self.info.service_id, RequestKind::OnChangeConfig),
        };

        ConfigRequest {
            target,
            kind,
            batching: Some(batching),
            delivery: self.info.delivery_type(),
            no_wakeup_msg_ids: self.info.no_wakeup_msg_ids.clone(),
        }
    }

    fn send_stream_config(&self, primary: &Connection, params: &SensorParams) -> Result<()> {
        let request = self.stream_request(params);
        let frame = self.ctx.codec.encode_request(&request)?;
        debug!("[SESSION] {} config {:?}", self.name, request.kind);
        primary.send_request(&frame, SendMode::Sync)?;
        Ok(())
    }

    fn send_calibration_config(
        &self,
        calibration: &Connection,
        delivery: DeliveryType,
        mode: SendMode,
    ) -> Result<()> {
        let Some(source) = &self.info.calibration else {
            return Ok(());
        };
        let request = ConfigRequest {
            target: source.service_id,
            kind: RequestKind::OnChangeConfig,
            batching: None,
            delivery,
            no_wakeup_msg_ids: Vec::new(),
        };
        let frame = self.ctx.codec.encode_request(&request)?;
        debug!(
            "[BIAS] {} calibration request {:?}",
            self.name, delivery
        );
        calibration.send_request(&frame, mode)?;
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        let resources = {
            let mut control = self.control.lock();
            match control.state {
                SessionState::Inactive => return Ok(()),
                SessionState::Activating | SessionState::Deactivating => {
                    return Err(SessionError::Busy(self.name.clone()))
                }
                SessionState::Active => {}
            }
            control.state = SessionState::Deactivating;
            self.data.lock().accepting = false;
            std::mem::take(&mut control.resources)
        };
        resources.release(&self.name);
        self.finish_deactivation();
        info!("[SESSION] {} inactive", self.name);
        Ok(())
    }

    /// Deactivate from a callback path; only acts on an active session
    fn tear_down(&self, reason: &str) {
        let resources = {
            let mut control = self.control.lock();
            if control.state != SessionState::Active {
                return;
            }
            control.state = SessionState::Deactivating;
            self.data.lock().accepting = false;
            std::mem::take(&mut control.resources)
        };
        warn!("[SESSION] {} going inactive: {}", self.name, reason);
        resources.release(&self.name);
        self.finish_deactivation();
    }

    fn finish_deactivation(&self) {
        {
            let mut data = self.data.lock();
            data.biases.clear();
            data.last_emitted = None;
        }
        self.pending_flush.store(0, Ordering::SeqCst);
        if self.ctx.config.stats_enabled {
            let now = self.ctx.connections.clock.elapsed_realtime_nanos();
            info!("[SESSION] {} stats: {}", self.name, self.stats.lock().report(now));
        }
        self.control.lock().state = SessionState::Inactive;
    }

    fn set_config(&self, params: SensorParams) -> Result<()> {
        self.validate(&params)?;
        let primary = {
            let mut control = self.control.lock();
            control.params = params;
            if control.state != SessionState::Active {
                return Ok(());
            }
            control.resources.primary.clone()
        };
        match primary {
            Some(primary) => self.send_stream_config(&primary, &params),
            None => Ok(()),
        }
    }

    fn flush(&self) -> Result<()> {
        let primary = {
            let control = self.control.lock();
            if control.state != SessionState::Active {
                debug!("[SESSION] {} flush while inactive", self.name);
                return Ok(());
            }
            control.resources.primary.clone()
        };
        let Some(primary) = primary else {
            return Ok(());
        };

        let request = ConfigRequest {
            target: self.info.resampler.unwrap_or(self.info.service_id),
            kind: RequestKind::Flush,
            batching: None,
            delivery: self.info.delivery_type(),
            no_wakeup_msg_ids: Vec::new(),
        };
        let frame = self.ctx.codec.encode_request(&request)?;

        self.pending_flush.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = primary.send_request(&frame, SendMode::Async) {
            let _ = self
                .pending_flush
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            return Err(e.into());
        }
        Ok(())
    }

    /// Look the data type up until our identifier is among the answers
    ///
    /// `keep_going` is checked before every trial.
    fn rediscover(&self, keep_going: impl Fn() -> bool) -> Result<()> {
        let clock = &self.ctx.connections.clock;
        let config = &self.ctx.config;
        let (_, timeout) = self.ctx.connections.access.budget(&self.ctx.connections.config);
        let started = clock.elapsed_realtime_nanos();

        for trial in 1..=config.rediscovery_retries {
            if !keep_going() {
                break;
            }
            let ids = discover_blocking(self.ctx.discovery.as_ref(), &self.info.data_type, timeout);
            if ids.contains(&self.info.service_id) {
                let elapsed_ms = clock.elapsed_realtime_nanos().saturating_sub(started) / 1_000_000;
                info!(
                    "[SESSION] {} after reset discovery took {} ms, {} trials",
                    self.name, elapsed_ms, trial
                );
                self.reset_requested.store(false, Ordering::SeqCst);
                return Ok(());
            }
            if trial < config.rediscovery_retries {
                clock.sleep(config.rediscovery_wait());
            }
        }
        Err(SessionError::ServiceUnavailable(self.info.data_type.clone()))
    }

    fn handle_primary_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectionReset => self.recover(),
            ConnectionEvent::ReconnectFailed => {
                self.reset_requested.store(true, Ordering::SeqCst);
                self.tear_down("primary channel could not be reopened");
            }
        }
    }

    fn recover(&self) {
        self.recovering.store(true, Ordering::SeqCst);
        self.reset_requested.store(true, Ordering::SeqCst);
        info!("[SESSION] {} coprocessor reset, re-confirming service", self.name);

        let still_active = || self.control.lock().state == SessionState::Active;
        let outcome = self.rediscover(still_active).and_then(|()| {
            let (primary, params) = {
                let control = self.control.lock();
                if control.state != SessionState::Active {
                    return Ok(());
                }
                (control.resources.primary.clone(), control.params)
            };
            match primary {
                Some(primary) => self.send_stream_config(&primary, &params),
                None => Ok(()),
            }
        });
        self.recovering.store(false, Ordering::SeqCst);

        if !still_active() {
            info!("[SESSION] {} deactivated during reset", self.name);
            return;
        }
        match outcome {
            Ok(()) => info!("[SESSION] {} restored after reset", self.name),
            Err(e) => {
                let failure = SessionError::RecoveryFailed(format!(
                    "could not restart {} after reset: {}",
                    self.name, e
                ));
                error!("[SESSION] {}", failure);
                self.tear_down("recovery failed");
            }
        }
    }

    fn handle_calibration_event(self: &Arc<Self>, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectionReset => {
                let delivery = self.calibration_delivery();
                info!("[BIAS] {} calibration channel reset, reissuing", self.name);
                self.reissue_calibration(delivery);
            }
            ConnectionEvent::ReconnectFailed => {
                warn!(
                    "[BIAS] {} calibration channel lost, samples continue with stale bias",
                    self.name
                );
            }
        }
    }

    /// Wake the host for biases only while they are unreliable
    fn calibration_delivery(&self) -> DeliveryType {
        if self.data.lock().bias_reliable {
            DeliveryType::NoWakeup
        } else {
            DeliveryType::Wakeup
        }
    }

    fn reissue_calibration(self: &Arc<Self>, delivery: DeliveryType) {
        let (calibration, worker) = {
            let control = self.control.lock();
            if control.state != SessionState::Active {
                return;
            }
            (
                control.resources.calibration.clone(),
                control.resources.reissue.clone(),
            )
        };
        let Some(calibration) = calibration else {
            return;
        };

        match worker {
            Some(worker) => {
                let weak = Arc::downgrade(self);
                let submitted = worker.submit(None, move |_| {
                    if let Some(inner) = weak.upgrade() {
                        if let Err(e) =
                            inner.send_calibration_config(&calibration, delivery, SendMode::Sync)
                        {
                            warn!("[BIAS] {} reissue failed: {}", inner.name, e);
                        }
                    }
                });
                if let Err(e) = submitted {
                    debug!("[BIAS] {} reissue not queued: {}", self.name, e);
                }
            }
            None => {
                if let Err(e) =
                    self.send_calibration_config(&calibration, delivery, SendMode::Async)
                {
                    warn!("[BIAS] {} reissue failed: {}", self.name, e);
                }
            }
        }
    }

    fn handle_calibration(self: &Arc<Self>, indication: Indication<'_>) {
        let events = match self.ctx.codec.decode_events(indication.payload) {
            Ok(events) => events,
            Err(e) => {
                warn!("[BIAS] {} undecodable calibration payload: {}", self.name, e);
                return;
            }
        };

        let mut crossing = None;
        {
            let mut data = self.data.lock();
            if !data.accepting {
                return;
            }
            for event in events {
                if event.kind != EventKind::Calibration {
                    debug!("[BIAS] {} ignoring {:?} on calibration stream", self.name, event.kind);
                    continue;
                }
                let [x, y, z] = match event.values.as_slice() {
                    [x, y, z, ..] => [*x, *y, *z],
                    short => {
                        warn!("[BIAS] {} bias with {} values dropped", self.name, short.len());
                        continue;
                    }
                };
                let bias = CalibrationBias {
                    bias: [x, y, z],
                    timestamp: event.timestamp,
                    quality: event.quality,
                };
                data.biases.push(bias);

                let reliable = bias.quality.is_reliable();
                if reliable != data.bias_reliable {
                    info!(
                        "[BIAS] {} reliability {} at {}",
                        self.name,
                        if reliable { "restored" } else { "lost" },
                        bias.timestamp
                    );
                    data.bias_reliable = reliable;
                    crossing = Some(if reliable {
                        DeliveryType::NoWakeup
                    } else {
                        DeliveryType::Wakeup
                    });
                }
            }
        }

        if let Some(delivery) = crossing {
            self.reissue_calibration(delivery);
        }
    }

    fn handle_data(&self, indication: Indication<'_>) {
        let _hold = self.wake_lock.as_deref().map(WakeHold::new);

        let events = match self.ctx.codec.decode_events(indication.payload) {
            Ok(events) => events,
            Err(e) => {
                warn!("[SESSION] {} undecodable payload: {}", self.name, e);
                return;
            }
        };

        let mut out = Vec::with_capacity(events.len());
        {
            let mut data = self.data.lock();
            if !data.accepting {
                return;
            }
            for event in events {
                match event.kind {
                    EventKind::Sample => {
                        if let Some(sample) = self.correct_sample(&mut data, event) {
                            out.push(SensorEvent::Sample(sample));
                        }
                    }
                    EventKind::FlushComplete => {
                        if let Some(flushed) = self.complete_flush(event.timestamp) {
                            out.push(flushed);
                        }
                    }
                    EventKind::Calibration | EventKind::Other(_) => {
                        debug!("[SESSION] {} ignoring {:?}", self.name, event.kind);
                    }
                }
            }
        }

        if self.ctx.config.stats_enabled {
            let mut stats = self.stats.lock();
            for event in &out {
                if let SensorEvent::Sample(sample) = event {
                    let latency = (indication.received_at_ns as i64).saturating_sub(sample.timestamp_ns);
                    stats.record(latency.max(0) as u64);
                }
            }
        }

        for event in out {
            self.sink.on_event(event);
        }
    }

    fn correct_sample(&self, data: &mut DataState, event: DecodedEvent) -> Option<SensorSample> {
        let mut values = event.values;
        if values.len() > MAX_SAMPLE_VALUES {
            error!(
                "[SESSION] {} sample has {} values, truncating to {}",
                self.name,
                values.len(),
                MAX_SAMPLE_VALUES
            );
            values.truncate(MAX_SAMPLE_VALUES);
        }

        let mut quality = event.quality;
        if self.info.calibration.is_some() {
            match data.biases.lookup(event.timestamp) {
                Some(bias) => {
                    for (value, offset) in values.iter_mut().zip(bias.bias.iter()) {
                        *value -= offset;
                    }
                    quality = quality.min(bias.quality);
                }
                None => quality = QualityStatus::Unreliable,
            }
        }

        let sample = SensorSample {
            handle: self.info.handle,
            timestamp_ns: self.ctx.clock.ticks_to_host_nanos(event.timestamp),
            values,
            quality,
        };

        if self.info.reporting_mode == ReportingMode::OnChange {
            if data.last_emitted.as_ref() == Some(&sample) {
                debug!("[SESSION] {} duplicate on-change sample dropped", self.name);
                return None;
            }
            data.last_emitted = Some(sample.clone());
        }
        Some(sample)
    }

    fn complete_flush(&self, ticks: u64) -> Option<SensorEvent> {
        if !self.info.honor_flush_events {
            debug!("[SESSION] {} flush event ignored", self.name);
            return None;
        }
        let claimed = self
            .pending_flush
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if claimed.is_err() {
            debug!("[SESSION] {} unsolicited flush event", self.name);
            return None;
        }
        Some(SensorEvent::FlushComplete {
            handle: self.info.handle,
            timestamp_ns: self.ctx.clock.ticks_to_host_nanos(ticks),
        })
    }
}
