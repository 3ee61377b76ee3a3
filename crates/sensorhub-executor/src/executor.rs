// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Serialized task executor
//!
//! # Design
//! - One named thread pops tasks from a FIFO under a mutex and runs them
//!   with the lock released
//! - A wake-lock reference is taken before a task is queued and returned
//!   after it finishes, so the host cannot suspend between submit and run
//! - A panicking task is logged and the executor keeps going
//! - Payloads are owned by their task; dropping the task frees them, which
//!   is how `stop()` disposes of work that never ran

use crate::error::{ExecutorError, Result};
use crate::wakelock::WakeLock;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Owned bytes handed to a task (typically a raw indication payload)
pub type TaskPayload = Box<dyn AsRef<[u8]> + Send>;

type TaskBody = Box<dyn FnOnce(Option<&[u8]>) + Send>;

struct PendingTask {
    payload: Option<TaskPayload>,
    body: TaskBody,
    wake_lock: Option<Arc<WakeLock>>,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<PendingTask>,
    stopping: bool,
    wake_lock: Option<Arc<WakeLock>>,
    /// Submitted and not yet completed or drained
    live: usize,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
}

/// Single-threaded FIFO executor owned by one connection
pub struct TaskExecutor {
    name: String,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TaskExecutor {
    /// Create an executor; `name` becomes the worker thread name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                available: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the worker thread
    pub fn start(&self) -> Result<()> {
        let mut thread_slot = self.thread.lock();
        if thread_slot.is_some() {
            return Err(ExecutorError::AlreadyRunning(self.name.clone()));
        }
        if self.shared.queue.lock().stopping {
            return Err(ExecutorError::Stopped(self.name.clone()));
        }

        let shared = Arc::clone(&self.shared);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_worker(&shared, &name))?;
        *thread_slot = Some(handle);
        debug!("[EXECUTOR] {} started", self.name);
        Ok(())
    }

    /// Attach the wake lock that keeps the host awake while tasks are pending
    ///
    /// Only tasks submitted after this call hold a reference.
    pub fn attach_wake_lock(&self, lock: Arc<WakeLock>) -> Result<()> {
        let mut queue = self.shared.queue.lock();
        if queue.wake_lock.is_some() {
            return Err(ExecutorError::AlreadyConfigured(self.name.clone()));
        }
        debug!("[EXECUTOR] {} attached wake lock {}", self.name, lock.name());
        queue.wake_lock = Some(lock);
        Ok(())
    }

    /// Queue a task
    ///
    /// The wake-lock reference is taken before the task becomes visible to
    /// the worker. Tasks submitted before `start()` run once it is called.
    pub fn submit<F>(&self, payload: Option<TaskPayload>, body: F) -> Result<()>
    where
        F: FnOnce(Option<&[u8]>) + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.stopping {
            return Err(ExecutorError::Stopped(self.name.clone()));
        }
        let wake_lock = queue.wake_lock.clone();
        if let Some(lock) = &wake_lock {
            lock.get_n_locks(1);
        }
        queue.tasks.push_back(PendingTask {
            payload,
            body: Box::new(body),
            wake_lock,
        });
        queue.live += 1;
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Stop the worker, join it, and drop every task that never ran
    ///
    /// Returns the number of drained tasks. Safe to call from inside a task:
    /// the worker is then left to exit on its own instead of being joined.
    pub fn stop(&self) -> usize {
        {
            let mut queue = self.shared.queue.lock();
            queue.stopping = true;
        }
        self.shared.available.notify_all();

        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() == thread::current().id() {
                debug!("[EXECUTOR] {} stopping from its own thread", self.name);
            } else if let Err(e) = handle.join() {
                error!("[EXECUTOR] {} join error: {:?}", self.name, e);
            }
        }

        let drained: Vec<PendingTask> = {
            let mut queue = self.shared.queue.lock();
            let drained: Vec<PendingTask> = queue.tasks.drain(..).collect();
            queue.live = queue.live.saturating_sub(drained.len());
            for task in &drained {
                if let Some(lock) = &task.wake_lock {
                    lock.put_n_locks(1);
                }
            }
            drained
        };
        let count = drained.len();
        drop(drained);

        if count > 0 {
            warn!("[EXECUTOR] {} dropped {} pending tasks", self.name, count);
        }
        count
    }

    pub fn is_running(&self) -> bool {
        !self.shared.queue.lock().stopping
            && self
                .thread
                .lock()
                .as_ref()
                .map_or(false, |h| !h.is_finished())
    }

    /// Tasks waiting in the queue
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }

    /// Tasks submitted but not yet completed (queued + running)
    pub fn live_tasks(&self) -> usize {
        self.shared.queue.lock().live
    }

    pub fn wake_lock(&self) -> Option<Arc<WakeLock>> {
        self.shared.queue.lock().wake_lock.clone()
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: &Shared, name: &str) {
    debug!("[EXECUTOR] {} worker running", name);
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            while queue.tasks.is_empty() && !queue.stopping {
                shared.available.wait(&mut queue);
            }
            if queue.stopping {
                break;
            }
            queue.tasks.pop_front()
        };
        let Some(PendingTask {
            payload,
            body,
            wake_lock,
        }) = task
        else {
            continue;
        };

        let bytes = payload.as_ref().map(|p| (**p).as_ref());
        let outcome = catch_unwind(AssertUnwindSafe(move || body(bytes)));
        if let Err(panic) = outcome {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("[EXECUTOR] {} task panicked: {}", name, message);
        }

        drop(payload);

        let mut queue = shared.queue.lock();
        queue.live = queue.live.saturating_sub(1);
        if let Some(lock) = wake_lock {
            lock.put_n_locks(1);
        }
    }
    debug!("[EXECUTOR] {} worker exited", name);
}
