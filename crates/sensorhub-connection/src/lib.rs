// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sensorhub-connection
//!
//! Owns one request/response + indication channel to the coprocessor and
//! recovers it transparently after a coprocessor restart.
//!
//! ## Architecture
//! - [`Transport`] / [`ServiceDiscovery`]: platform boundary
//! - [`Connection`]: per-session channel with its own [`TaskExecutor`]
//!   delivering indications in arrival order
//! - [`RestartGovernor`]: process-wide send-failure accounting and
//!   rate-limited restart requests
//! - [`RequestWatchdog`]: detects a transport that never answers
//! - [`loopback`]: in-process transport for the simulator and tests
//!
//! [`TaskExecutor`]: sensorhub_executor::TaskExecutor

pub mod connection;
pub mod discovery;
pub mod error;
pub mod governor;
pub mod loopback;
pub mod retry;
pub mod transport;
pub mod watchdog;

pub use connection::{
    Connection, ConnectionContext, ConnectionEvent, ConnectionOptions, ConnectionState,
    ErrorCallback, Indication, IndicationCallback, ResponseCallback, SendMode,
};
pub use discovery::{
    discover_blocking, DiscoveryCallback, ServiceAccessLatch, ServiceDiscovery, ServiceIdentifier,
};
pub use error::{ConnectionError, Result, TransportError};
pub use governor::RestartGovernor;
pub use retry::{retry_with_backoff, RetryStrategy, Retryable};
pub use transport::{
    AsyncCompletion, ChannelHandle, ErrorHandler, IndicationHandler, MessageId, Transport,
    TransportHandlers,
};
pub use watchdog::RequestWatchdog;
