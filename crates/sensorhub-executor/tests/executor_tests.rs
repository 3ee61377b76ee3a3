use crossbeam::channel;
use parking_lot::Mutex;
use sensorhub_executor::{ExecutorError, TaskExecutor, TaskPayload, WakeLock, WakeLockRegistry};
use sensorhub_hal::sim::RecordingWakeLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

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

/// Payload that counts how many times it has been dropped
struct TrackedBuffer {
    bytes: Vec<u8>,
    drops: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for TrackedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn tracked(drops: &Arc<AtomicUsize>, byte: u8) -> TaskPayload {
    Box::new(TrackedBuffer {
        bytes: vec![byte; 8],
        drops: Arc::clone(drops),
    })
}

#[test]
fn tasks_run_in_submission_order_regardless_of_duration() {
    let executor = TaskExecutor::new("fifo");
    executor.start().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let durations = [5u64, 0, 3, 0, 1, 7, 0, 2, 0, 4];
    for (i, ms) in durations.iter().enumerate() {
        let order = Arc::clone(&order);
        let ms = *ms;
        executor
            .submit(None, move |_| {
                thread::sleep(Duration::from_millis(ms));
                order.lock().push(i);
            })
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || order.lock().len() == durations.len()));
    assert_eq!(*order.lock(), (0..durations.len()).collect::<Vec<_>>());
    executor.stop();
}

#[test]
fn tasks_never_run_concurrently() {
    let executor = TaskExecutor::new("serial");
    executor.start().unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let in_flight = Arc::clone(&in_flight);
        let max_seen = Arc::clone(&max_seen);
        let done = Arc::clone(&done);
        executor
            .submit(None, move |_| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 20));
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    executor.stop();
}

#[test]
fn wake_lock_held_exactly_while_tasks_are_live() {
    let backend = Arc::new(RecordingWakeLock::new());
    let registry = WakeLockRegistry::new(backend.clone());
    let executor = TaskExecutor::new("wake");
    executor.attach_wake_lock(registry.get("sensorhub_see")).unwrap();

    let (release_tx, release_rx) = channel::bounded::<()>(0);
    let held_inside = Arc::new(AtomicUsize::new(0));
    let probe_backend = Arc::clone(&backend);
    let probe = Arc::clone(&held_inside);

    // Not started yet: the lock must already be held once the task is queued
    executor
        .submit(None, move |_| {
            if probe_backend.is_held("sensorhub_see") {
                probe.fetch_add(1, Ordering::SeqCst);
            }
            let _ = release_rx.recv();
        })
        .unwrap();
    assert!(backend.is_held("sensorhub_see"));
    assert_eq!(executor.live_tasks(), 1);

    executor.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || executor.pending() == 0));
    assert!(backend.is_held("sensorhub_see"), "released before the task finished");

    release_tx.send(()).unwrap();
    assert!(wait_until(Duration::from_secs(2), || executor.live_tasks() == 0));
    assert!(wait_until(Duration::from_secs(2), || !backend.is_held("sensorhub_see")));
    assert_eq!(held_inside.load(Ordering::SeqCst), 1);
    assert_eq!(executor.wake_lock().map(|l| l.ref_count()), Some(0));
    executor.stop();
}

#[test]
fn attach_wake_lock_twice_is_already_configured() {
    let backend = Arc::new(RecordingWakeLock::new());
    let executor = TaskExecutor::new("twice");
    executor
        .attach_wake_lock(Arc::new(WakeLock::new("a", backend.clone())))
        .unwrap();
    let second = executor.attach_wake_lock(Arc::new(WakeLock::new("b", backend)));
    assert!(matches!(second, Err(ExecutorError::AlreadyConfigured(_))));
    assert_eq!(executor.wake_lock().map(|l| l.name().to_string()), Some("a".to_string()));
}

#[test]
fn panicking_task_does_not_stop_the_executor() {
    let executor = TaskExecutor::new("panic");
    executor.start().unwrap();
    let ran_after = Arc::new(AtomicUsize::new(0));

    executor
        .submit(None, |_| panic!("task failure"))
        .unwrap();
    let r = Arc::clone(&ran_after);
    executor
        .submit(None, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || ran_after.load(Ordering::SeqCst) == 1));
    assert!(executor.is_running());
    assert_eq!(executor.stop(), 0);
}

#[test]
fn stop_frees_each_queued_buffer_exactly_once() {
    let backend = Arc::new(RecordingWakeLock::new());
    let executor = Arc::new(TaskExecutor::new("drain"));
    executor
        .attach_wake_lock(Arc::new(WakeLock::new("drain", backend.clone())))
        .unwrap();
    executor.start().unwrap();

    let (started_tx, started_rx) = channel::bounded::<()>(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);
    executor
        .submit(None, move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        })
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    let executed = Arc::new(AtomicUsize::new(0));
    for i in 0..3u8 {
        let executed = Arc::clone(&executed);
        executor
            .submit(Some(tracked(&drops, i)), move |_| {
                executed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    assert_eq!(executor.pending(), 3);

    // Unblock the running task only after stop() has raised the flag
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = release_tx.send(());
    });
    let drained = executor.stop();
    releaser.join().unwrap();

    assert_eq!(drained, 3);
    assert_eq!(executed.load(Ordering::SeqCst), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
    assert_eq!(executor.live_tasks(), 0);
    assert!(!backend.is_held("drain"));

    drop(executor);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

#[test]
fn executed_buffers_are_freed_after_their_task() {
    let executor = TaskExecutor::new("free");
    executor.start().unwrap();
    let drops = Arc::new(AtomicUsize::new(0));
    let seen_len = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen_len);
    executor
        .submit(Some(tracked(&drops, 9)), move |bytes| {
            s.store(bytes.map_or(0, |b| b.len()), Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || drops.load(Ordering::SeqCst) == 1));
    assert_eq!(seen_len.load(Ordering::SeqCst), 8);
    executor.stop();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_from_inside_a_task_does_not_deadlock() {
    let executor = Arc::new(TaskExecutor::new("self-stop"));
    executor.start().unwrap();
    let stopped = Arc::new(AtomicUsize::new(0));

    let inner = Arc::clone(&executor);
    let s = Arc::clone(&stopped);
    executor
        .submit(None, move |_| {
            inner.stop();
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || stopped.load(Ordering::SeqCst) == 1));
    assert!(wait_until(Duration::from_secs(2), || !executor.is_running()));
}
