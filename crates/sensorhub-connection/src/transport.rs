// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport boundary
//!
//! The connection layer is written against this trait; the platform's
//! message-passing channel (or [`crate::loopback::LoopbackTransport`] in
//! tests) implements it.

use crate::error::TransportError;
use std::sync::Arc;
use std::time::Duration;

/// Opaque handle to one open channel
pub type ChannelHandle = u64;

/// Indication message ids carried by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Report,
    JumboReport,
    Unknown(u32),
}

impl MessageId {
    /// Only report-style indications carry sensor payloads
    pub fn is_report(self) -> bool {
        matches!(self, MessageId::Report | MessageId::JumboReport)
    }
}

pub type IndicationHandler = Arc<dyn Fn(MessageId, Vec<u8>) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Low-level callbacks registered with the transport on open
///
/// Both run on the transport's own delivery thread.
#[derive(Clone)]
pub struct TransportHandlers {
    pub on_indication: IndicationHandler,
    pub on_error: ErrorHandler,
}

/// Completion of an asynchronous send
pub type AsyncCompletion = Box<dyn FnOnce(Result<(), TransportError>) + Send + 'static>;

pub trait Transport: Send + Sync {
    /// Block up to `timeout` for the client-manager service to appear
    fn wait_for_service(&self, timeout: Duration) -> Result<(), TransportError>;

    fn open(&self, handlers: TransportHandlers) -> Result<ChannelHandle, TransportError>;

    fn close(&self, handle: ChannelHandle);

    /// Send one frame and wait for its response
    fn send_sync(
        &self,
        handle: ChannelHandle,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Send one frame; `on_complete` fires later from the transport thread
    fn send_async(
        &self,
        handle: ChannelHandle,
        frame: Vec<u8>,
        on_complete: AsyncCompletion,
    ) -> Result<(), TransportError>;
}
