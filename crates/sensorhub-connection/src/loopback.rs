// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-process transport and discovery
//!
//! [`LoopbackTransport`] stands in for the coprocessor channel: requests are
//! recorded, and indications, errors and async completions are pushed by the
//! caller and delivered from a dedicated "transport" thread, the same way a
//! real transport calls back from its own thread. Used by the simulator and
//! by tests across the workspace.

use crate::discovery::{DiscoveryCallback, ServiceDiscovery, ServiceIdentifier};
use crate::error::TransportError;
use crate::transport::{AsyncCompletion, ChannelHandle, MessageId, Transport, TransportHandlers};
use ahash::AHashMap;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

enum Delivery {
    Indication(ChannelHandle, MessageId, Vec<u8>),
    Error(ChannelHandle, TransportError),
    Completion(AsyncCompletion, Result<(), TransportError>),
    Barrier(Sender<()>),
    Shutdown,
}

/// Observer for outgoing frames, e.g. a fake coprocessor answering requests
pub type RequestHook = Arc<dyn Fn(ChannelHandle, &[u8]) + Send + Sync>;

struct LoopbackState {
    service_available: bool,
    next_handle: ChannelHandle,
    channels: BTreeMap<ChannelHandle, TransportHandlers>,
    sent: Vec<(ChannelHandle, Vec<u8>)>,
    failures: VecDeque<TransportError>,
    hold_completions: bool,
    held: Vec<AsyncCompletion>,
    request_hook: Option<RequestHook>,
    opens: usize,
    closes: usize,
    service_waits: usize,
}

struct LoopbackShared {
    state: Mutex<LoopbackState>,
}

impl LoopbackShared {
    fn handlers_for(&self, handle: ChannelHandle) -> Option<TransportHandlers> {
        self.state.lock().channels.get(&handle).cloned()
    }
}

pub struct LoopbackTransport {
    shared: Arc<LoopbackShared>,
    deliveries: Sender<Delivery>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackTransport {
    /// Transport with the service available and its delivery thread running
    pub fn new() -> std::io::Result<Self> {
        let shared = Arc::new(LoopbackShared {
            state: Mutex::new(LoopbackState {
                service_available: true,
                next_handle: 1,
                channels: BTreeMap::new(),
                sent: Vec::new(),
                failures: VecDeque::new(),
                hold_completions: false,
                held: Vec::new(),
                request_hook: None,
                opens: 0,
                closes: 0,
                service_waits: 0,
            }),
        });
        let (tx, rx) = channel::unbounded();
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("loopback_transport".to_string())
            .spawn(move || run_deliveries(&worker, rx))?;
        Ok(Self {
            shared,
            deliveries: tx,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn set_service_available(&self, available: bool) {
        self.shared.state.lock().service_available = available;
    }

    /// Push an indication onto `handle`
    pub fn indicate(&self, handle: ChannelHandle, msg_id: MessageId, payload: Vec<u8>) {
        let _ = self
            .deliveries
            .send(Delivery::Indication(handle, msg_id, payload));
    }

    /// Report a transport error on `handle`, as after a coprocessor restart
    pub fn inject_error(&self, handle: ChannelHandle, error: TransportError) {
        let _ = self.deliveries.send(Delivery::Error(handle, error));
    }

    /// Fail the next sends, one queued error per send
    pub fn fail_next_sends(&self, count: usize, error: TransportError) {
        let mut state = self.shared.state.lock();
        for _ in 0..count {
            state.failures.push_back(error.clone());
        }
    }

    /// Hold async completions until [`release_completions`](Self::release_completions)
    pub fn hold_completions(&self, hold: bool) {
        self.shared.state.lock().hold_completions = hold;
    }

    pub fn release_completions(&self) {
        let held: Vec<AsyncCompletion> = std::mem::take(&mut self.shared.state.lock().held);
        for completion in held {
            let _ = self.deliveries.send(Delivery::Completion(completion, Ok(())));
        }
    }

    pub fn set_request_hook(&self, hook: RequestHook) {
        self.shared.state.lock().request_hook = Some(hook);
    }

    /// Wait until every delivery pushed so far has been handed to its handler
    pub fn sync(&self) {
        let (tx, rx) = channel::bounded(1);
        if self.deliveries.send(Delivery::Barrier(tx)).is_ok() {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        }
    }

    /// Currently open handles, oldest first
    pub fn open_handles(&self) -> Vec<ChannelHandle> {
        self.shared.state.lock().channels.keys().copied().collect()
    }

    pub fn latest_handle(&self) -> Option<ChannelHandle> {
        self.open_handles().last().copied()
    }

    pub fn sent_frames(&self, handle: ChannelHandle) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .sent
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn all_sent_frames(&self) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .sent
            .iter()
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.shared.state.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.shared.state.lock().closes
    }

    pub fn service_waits(&self) -> usize {
        self.shared.state.lock().service_waits
    }

    fn record_send(&self, handle: ChannelHandle, frame: &[u8]) -> Result<(), TransportError> {
        let hook = {
            let mut state = self.shared.state.lock();
            if !state.channels.contains_key(&handle) {
                return Err(TransportError::Disconnected);
            }
            if let Some(error) = state.failures.pop_front() {
                return Err(error);
            }
            state.sent.push((handle, frame.to_vec()));
            state.request_hook.clone()
        };
        if let Some(hook) = hook {
            hook(handle, frame);
        }
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    /// Answers immediately instead of blocking for `timeout`
    fn wait_for_service(&self, _timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        state.service_waits += 1;
        if state.service_available {
            Ok(())
        } else {
            Err(TransportError::Timeout)
        }
    }

    fn open(&self, handlers: TransportHandlers) -> Result<ChannelHandle, TransportError> {
        let mut state = self.shared.state.lock();
        if !state.service_available {
            return Err(TransportError::Disconnected);
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.channels.insert(handle, handlers);
        state.opens += 1;
        debug!("[LOOPBACK] opened channel {}", handle);
        Ok(handle)
    }

    fn close(&self, handle: ChannelHandle) {
        let mut state = self.shared.state.lock();
        if state.channels.remove(&handle).is_some() {
            state.closes += 1;
            debug!("[LOOPBACK] closed channel {}", handle);
        }
    }

    fn send_sync(
        &self,
        handle: ChannelHandle,
        frame: &[u8],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.record_send(handle, frame)
    }

    fn send_async(
        &self,
        handle: ChannelHandle,
        frame: Vec<u8>,
        on_complete: AsyncCompletion,
    ) -> Result<(), TransportError> {
        self.record_send(handle, &frame)?;
        let mut state = self.shared.state.lock();
        if state.hold_completions {
            state.held.push(on_complete);
        } else {
            drop(state);
            let _ = self
                .deliveries
                .send(Delivery::Completion(on_complete, Ok(())));
        }
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        let _ = self.deliveries.send(Delivery::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run_deliveries(shared: &LoopbackShared, rx: Receiver<Delivery>) {
    while let Ok(delivery) = rx.recv() {
        match delivery {
            Delivery::Indication(handle, msg_id, payload) => {
                match shared.handlers_for(handle) {
                    Some(handlers) => (handlers.on_indication)(msg_id, payload),
                    None => trace!("[LOOPBACK] indication for closed channel {}", handle),
                }
            }
            Delivery::Error(handle, error) => {
                if let Some(handlers) = shared.handlers_for(handle) {
                    (handlers.on_error)(error);
                }
            }
            Delivery::Completion(completion, result) => completion(result),
            Delivery::Barrier(done) => {
                let _ = done.send(());
            }
            Delivery::Shutdown => break,
        }
    }
}

/// Discovery backed by a fixed table; answers inline
#[derive(Default)]
pub struct StaticDiscovery {
    table: Mutex<AHashMap<String, Vec<ServiceIdentifier>>>,
    lookups: AtomicUsize,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, data_type: &str, id: ServiceIdentifier) {
        self.table
            .lock()
            .entry(data_type.to_string())
            .or_default()
            .push(id);
    }

    pub fn remove(&self, data_type: &str) {
        self.table.lock().remove(data_type);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ServiceDiscovery for StaticDiscovery {
    fn lookup(&self, data_type: &str, on_result: DiscoveryCallback) {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let ids = self.table.lock().get(data_type).cloned().unwrap_or_default();
        on_result(ids);
    }
}
