// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Sensor-hub host simulator

Drives one calibrated accelerometer session end to end against the loopback
transport and the simulated platform: biases and samples are injected as a
coprocessor would send them, a coprocessor reset is simulated halfway, and
every finished event is printed as one JSON line.

Usage:
  cargo run --bin sensorhub_sim -- [--config sensorhub.toml] [--samples N] [key=value ...]

Overrides use the CLI keys understood by the config loader, e.g.
`stats=true` or `realtime=true`. Debug flags: `--debug-<crate>`, `--debug-all`.
*/

use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, Receiver};
use sensorhub::config::{load_config, ConfigError, HubConfig};
use sensorhub::connection::loopback::{LoopbackTransport, StaticDiscovery};
use sensorhub::connection::{ConnectionContext, MessageId, ServiceIdentifier, TransportError};
use sensorhub::hal::sim::SimPlatform;
use sensorhub::observability::{init_console_logging, parse_debug_flags, LoggingGuard};
use sensorhub::session::{
    CalibrationSource, DecodedEvent, JsonCodec, QualityStatus, RequestKind, SensorEvent,
    SensorInfo, SensorParams, SensorSession, SessionContext,
};
use sensorhub::timesync::{ClockTranslator, OffsetUpdater};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const ACCEL: ServiceIdentifier = ServiceIdentifier::new(0x0000_acce_1000_0001, 0x1);
const ACCEL_CAL: ServiceIdentifier = ServiceIdentifier::new(0x0000_acce_1000_0001, 0xca1);
const SAMPLE_PERIOD_NS: u64 = 20_000_000;
const BIAS_EVERY: usize = 25;

struct Args {
    config: Option<PathBuf>,
    samples: usize,
    overrides: HashMap<String, String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        samples: 200,
        overrides: HashMap::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config = Some(PathBuf::from(iter.next().context("--config needs a path")?));
            }
            "--samples" => {
                args.samples = iter
                    .next()
                    .context("--samples needs a count")?
                    .parse()
                    .context("--samples must be a number")?;
            }
            flag if flag.starts_with("--debug") => {}
            pair => match pair.split_once('=') {
                Some((key, value)) => {
                    args.overrides.insert(key.to_string(), value.to_string());
                }
                None => bail!("unrecognized argument: {}", pair),
            },
        }
    }
    Ok(args)
}

fn load(args: &Args) -> Result<HubConfig> {
    match load_config(args.config.as_deref(), Some(&args.overrides)) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(searched)) if args.config.is_none() => {
            eprintln!("no sensorhub.toml found ({}), using defaults", searched);
            let mut config = HubConfig::default();
            sensorhub::config::apply_environment_overrides(&mut config);
            sensorhub::config::apply_cli_overrides(&mut config, &args.overrides);
            sensorhub::config::validate_config(&config)?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(config: &HubConfig) -> Result<LoggingGuard> {
    let flags = parse_debug_flags();
    #[cfg(feature = "file-logging")]
    {
        if config.logging.file_logging {
            return sensorhub::observability::init_logging(
                &flags,
                &config.logging.level,
                Some(config.logging.log_dir.clone()),
                Some(config.logging.retention_days),
                Some(config.logging.retention_runs),
            );
        }
    }
    init_console_logging(&flags, &config.logging.level)
}

/// Answer flush requests the way the coprocessor does
fn install_fake_coprocessor(transport: &Arc<LoopbackTransport>, translator: Arc<ClockTranslator>) {
    let weak: Weak<LoopbackTransport> = Arc::downgrade(transport);
    transport.set_request_hook(Arc::new(move |handle: u64, frame: &[u8]| {
        let Ok(request) = JsonCodec.decode_request(frame) else {
            return;
        };
        if request.kind != RequestKind::Flush {
            return;
        }
        let Some(transport) = weak.upgrade() else {
            return;
        };
        match JsonCodec.encode_events(&[DecodedEvent::flush_complete(translator.now())]) {
            Ok(payload) => transport.indicate(handle, MessageId::Report, payload),
            Err(e) => warn!("[SIM] flush reply not encoded: {}", e),
        }
    }));
}

fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn indicate(transport: &LoopbackTransport, handle: u64, event: DecodedEvent) -> Result<()> {
    let payload = JsonCodec.encode_events(&[event])?;
    transport.indicate(handle, MessageId::Report, payload);
    Ok(())
}

fn drain(rx: &Receiver<SensorEvent>, printed: &mut usize) -> Result<()> {
    while let Ok(event) = rx.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
        *printed += 1;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = load(&args)?;
    let _guard = init_tracing(&config)?;

    let platform = SimPlatform::new(
        1_000_000_000,
        config.timesync.counter_frequency_hz,
        250_000,
    );
    let translator = Arc::new(ClockTranslator::new(
        platform.counter.clone(),
        platform.clock.clone(),
        &config.timesync,
    )?);
    info!("[SIM] clock offset {} ns", translator.init());

    let mut updater = OffsetUpdater::new(Arc::clone(&translator));
    if config.timesync.updater_enabled {
        updater.start(Some(Box::new(|offset: i64| {
            info!("[SIM] clock offset now {} ns", offset)
        })))?;
    }

    let transport = Arc::new(LoopbackTransport::new()?);
    install_fake_coprocessor(&transport, Arc::clone(&translator));
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.insert("accel", ACCEL);
    discovery.insert("accel_cal", ACCEL_CAL);

    let connections = Arc::new(ConnectionContext::new(
        transport.clone(),
        &platform.services(),
        config.connection.clone(),
    ));
    let ctx = Arc::new(SessionContext::new(
        connections,
        discovery,
        Arc::clone(&translator),
        config.session.clone(),
    ));

    let (tx, rx) = channel::unbounded();
    let info = SensorInfo {
        calibration: Some(CalibrationSource {
            data_type: "accel_cal".to_string(),
            service_id: ACCEL_CAL,
        }),
        ..SensorInfo::streaming(1, "accel", ACCEL)
    };
    let session = SensorSession::new(ctx, info, Arc::new(tx));
    session.set_config(SensorParams {
        sample_period_ns: SAMPLE_PERIOD_NS,
        max_latency_ns: 200_000_000,
    })?;
    session.activate()?;

    let mut printed = 0;
    let reset_at = args.samples / 2;
    for i in 0..args.samples {
        let (Some(primary), Some(calibration)) = session.channel_handles() else {
            bail!("session lost its channels at sample {}", i);
        };

        if i % BIAS_EVERY == 0 {
            let drift = (i / BIAS_EVERY) as f32 * 0.01;
            let quality = if i == 0 {
                QualityStatus::Low
            } else {
                QualityStatus::High
            };
            indicate(
                &transport,
                calibration,
                DecodedEvent::calibration(translator.now(), [0.05 + drift, -0.02, 0.1], quality),
            )?;
            transport.sync();
        }

        platform.clock.advance(Duration::from_nanos(SAMPLE_PERIOD_NS));
        let phase = i as f32 * 0.1;
        indicate(
            &transport,
            primary,
            DecodedEvent::sample(
                translator.now(),
                vec![phase.sin(), phase.cos(), 9.81],
                QualityStatus::High,
            ),
        )?;

        if i == reset_at {
            info!("[SIM] simulating coprocessor restart");
            transport.sync();
            transport.inject_error(primary, TransportError::Disconnected);
            let recovered = wait_for(Duration::from_secs(5), || {
                matches!(session.channel_handles().0, Some(handle) if handle != primary)
                    && !session.is_recovering()
            });
            if !recovered {
                bail!("session did not recover from the simulated restart");
            }
        }
        drain(&rx, &mut printed)?;
    }

    session.flush()?;
    wait_for(Duration::from_secs(2), || session.pending_flushes() == 0);
    transport.sync();
    wait_for(Duration::from_millis(200), || !rx.is_empty());
    drain(&rx, &mut printed)?;

    let stats = session.stats();
    session.deactivate()?;
    updater.stop();
    info!(
        "[SIM] printed {} events, {} transport opens, {}",
        printed,
        transport.opens(),
        stats
    );
    Ok(())
}
