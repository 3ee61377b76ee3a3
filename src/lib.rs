//! # sensorhub - Sensor-hub client runtime core
//!
//! Streams sensor data from an always-on coprocessor over an asynchronous
//! message channel, corrects it with calibration biases that arrive on
//! independent streams, and republishes it with host-domain timestamps.
//! Channels survive coprocessor restarts, and the host is kept awake only
//! while data is in flight.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! sensorhub = "0.3"
//! ```
//!
//! ## Feature Flags
//!
//! - **`file-logging`** (default): per-crate JSON log files with run folders
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sensorhub::prelude::*;
//! use sensorhub::connection::loopback::{LoopbackTransport, StaticDiscovery};
//! use sensorhub::hal::sim::SimPlatform;
//! use std::sync::Arc;
//!
//! let config = HubConfig::default();
//! let platform = SimPlatform::new(0, 19_200_000, 0);
//! let transport = Arc::new(LoopbackTransport::new()?);
//! let discovery = Arc::new(StaticDiscovery::new());
//!
//! let clock = Arc::new(ClockTranslator::new(
//!     platform.counter.clone(),
//!     platform.clock.clone(),
//!     &config.timesync,
//! )?);
//! clock.init();
//!
//! let connections = Arc::new(ConnectionContext::new(
//!     transport,
//!     &platform.services(),
//!     config.connection.clone(),
//! ));
//! let ctx = Arc::new(SessionContext::new(connections, discovery, clock, config.session.clone()));
//!
//! let (tx, rx) = crossbeam::channel::unbounded();
//! let accel = SensorInfo::streaming(1, "accel", ServiceIdentifier::new(0xacc, 1));
//! let session = SensorSession::new(ctx, accel, Arc::new(tx));
//! session.set_config(SensorParams { sample_period_ns: 20_000_000, max_latency_ns: 0 })?;
//! session.activate()?;
//! # let _ = rx;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: sensorhub-config, sensorhub-observability  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Platform: sensorhub-hal                                │
//! │  (counter register, host clock, wake lock, restart)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Runtime: sensorhub-executor, sensorhub-timesync        │
//! │  (serialized delivery, clock domain translation)        │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Channels: sensorhub-connection                         │
//! │  (discovery, send/retry, reconnect after reset)         │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Sessions: sensorhub-session                            │
//! │  (bias correction, flush, reset recovery)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use sensorhub_config as config;
pub use sensorhub_connection as connection;
pub use sensorhub_executor as executor;
pub use sensorhub_hal as hal;
pub use sensorhub_observability as observability;
pub use sensorhub_session as session;
pub use sensorhub_timesync as timesync;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::config::{ConnectionConfig, HubConfig, SessionConfig, TimeSyncConfig};

    pub use crate::connection::{
        Connection, ConnectionContext, ConnectionEvent, ServiceDiscovery, ServiceIdentifier,
        Transport,
    };

    pub use crate::executor::{TaskExecutor, WakeLock, WakeLockRegistry};

    pub use crate::hal::{CounterSource, HostClock, PlatformServices};

    pub use crate::session::{
        CalibrationSource, QualityStatus, SampleSink, SensorEvent, SensorInfo, SensorParams,
        SensorSample, SensorSession, SessionContext,
    };

    pub use crate::timesync::{ClockTranslator, OffsetUpdater};
}
