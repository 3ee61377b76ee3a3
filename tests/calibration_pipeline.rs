//! End-to-end: config file -> platform -> connections -> calibrated session

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;
use sensorhub::config::load_config;
use sensorhub::connection::loopback::{LoopbackTransport, StaticDiscovery};
use sensorhub::connection::{MessageId, ServiceIdentifier};
use sensorhub::hal::sim::SimPlatform;
use sensorhub::prelude::*;
use sensorhub::session::{DecodedEvent, DeliveryType, JsonCodec};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const GYRO: ServiceIdentifier = ServiceIdentifier::new(0x6e0, 1);
const GYRO_CAL: ServiceIdentifier = ServiceIdentifier::new(0x6e0, 0xca1);
const SKEW_NS: i64 = 5_000;

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

struct Stack {
    sim: SimPlatform,
    transport: Arc<LoopbackTransport>,
    clock: Arc<ClockTranslator>,
    session: SensorSession,
    rx: Receiver<SensorEvent>,
}

fn stack(toml: &str) -> Stack {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    let config = load_config(Some(file.path()), None).unwrap();

    let sim = SimPlatform::new(2_000_000_000, 1_000_000_000, SKEW_NS);
    let transport = Arc::new(LoopbackTransport::new().unwrap());
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.insert("gyro", GYRO);
    discovery.insert("gyro_cal", GYRO_CAL);

    let clock = Arc::new(
        ClockTranslator::new(sim.counter.clone(), sim.clock.clone(), &config.timesync).unwrap(),
    );
    clock.init();
    let connections = Arc::new(ConnectionContext::new(
        transport.clone(),
        &sim.services(),
        config.connection.clone(),
    ));
    let ctx = Arc::new(SessionContext::new(
        connections,
        discovery,
        Arc::clone(&clock),
        config.session.clone(),
    ));

    let (tx, rx) = channel::unbounded();
    let info = SensorInfo {
        calibration: Some(CalibrationSource {
            data_type: "gyro_cal".to_string(),
            service_id: GYRO_CAL,
        }),
        ..SensorInfo::streaming(21, "gyro", GYRO)
    };
    let session = SensorSession::new(ctx, info, Arc::new(tx));
    session
        .set_config(SensorParams {
            sample_period_ns: 5_000_000,
            max_latency_ns: 0,
        })
        .unwrap();
    session.activate().unwrap();

    Stack {
        sim,
        transport,
        clock,
        session,
        rx,
    }
}

fn send(stack: &Stack, handle: u64, event: DecodedEvent) {
    let payload = JsonCodec.encode_events(&[event]).unwrap();
    stack.transport.indicate(handle, MessageId::Report, payload);
}

fn next_sample(stack: &Stack) -> SensorSample {
    match stack.rx.recv_timeout(Duration::from_secs(2)).unwrap() {
        SensorEvent::Sample(sample) => sample,
        other => panic!("expected a sample, got {:?}", other),
    }
}

#[test]
fn realtime_delivery_corrects_samples_and_reissues_on_a_worker() {
    let stack = stack(
        r#"
        [connection]
        realtime_delivery = true

        [session]
        low_latency_bias_reissue = true
        "#,
    );
    let (Some(primary), Some(cal)) = stack.session.channel_handles() else {
        panic!("both channels should be open");
    };

    send(&stack, cal, DecodedEvent::calibration(1_000, [0.25; 3], QualityStatus::High));
    assert!(wait_until(Duration::from_secs(2), || stack.session.bias_count() == 1));

    // The worker sends the no-wakeup reissue, not the transport thread
    let deliveries = Arc::new(Mutex::new(Vec::new()));
    assert!(wait_until(Duration::from_secs(2), || {
        let frames = stack.transport.sent_frames(cal);
        let mut seen = deliveries.lock();
        *seen = frames
            .iter()
            .map(|f| JsonCodec.decode_request(f).unwrap().delivery)
            .collect();
        seen.len() == 2
    }));
    assert_eq!(
        *deliveries.lock(),
        vec![DeliveryType::Wakeup, DeliveryType::NoWakeup]
    );

    send(&stack, primary, DecodedEvent::sample(1_500, vec![1.0, 1.0, 1.0], QualityStatus::Medium));
    let sample = next_sample(&stack);
    assert_eq!(sample.values, vec![0.75, 0.75, 0.75]);
    assert_eq!(sample.quality, QualityStatus::Medium);
    assert_eq!(sample.timestamp_ns, 1_500 + SKEW_NS);
}

#[test]
fn sample_timestamps_follow_a_refreshed_offset() {
    let stack = stack("");
    let (Some(primary), _) = stack.session.channel_handles() else {
        panic!("primary should be open");
    };

    send(&stack, primary, DecodedEvent::sample(10, vec![0.0; 3], QualityStatus::High));
    assert_eq!(next_sample(&stack).timestamp_ns, 10 + SKEW_NS);

    stack.sim.counter.set_skew(SKEW_NS + 2_000);
    assert!(stack.clock.recalculate_offset(true));

    send(&stack, primary, DecodedEvent::sample(20, vec![0.0; 3], QualityStatus::High));
    assert_eq!(next_sample(&stack).timestamp_ns, 20 + SKEW_NS + 2_000);
}

#[test]
fn coprocessor_restart_is_invisible_to_the_consumer() {
    let stack = stack("");
    let (Some(old), Some(cal)) = stack.session.channel_handles() else {
        panic!("both channels should be open");
    };
    send(&stack, cal, DecodedEvent::calibration(100, [1.0; 3], QualityStatus::High));
    assert!(wait_until(Duration::from_secs(2), || stack.session.bias_count() == 1));

    stack
        .transport
        .inject_error(old, sensorhub::connection::TransportError::Disconnected);
    assert!(wait_until(Duration::from_secs(2), || {
        matches!(stack.session.channel_handles().0, Some(new) if new != old)
            && !stack.session.is_recovering()
    }));
    assert!(stack.session.is_active());

    let new = stack.session.channel_handles().0.unwrap();
    send(&stack, new, DecodedEvent::sample(200, vec![3.0; 3], QualityStatus::High));
    assert_eq!(next_sample(&stack).values, vec![2.0; 3]);

    stack.session.deactivate().unwrap();
    assert!(stack.transport.open_handles().is_empty());
}
