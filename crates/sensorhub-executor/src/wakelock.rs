// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reference-counted wake locks
//!
//! The system wake assertion is held exactly while the reference count is
//! non-zero. Locks are shared by name through a [`WakeLockRegistry`] that is
//! constructed once at startup and injected where needed.

use ahash::AHashMap;
use parking_lot::Mutex;
use sensorhub_hal::WakeLockBackend;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Named wake lock with a saturating reference count
pub struct WakeLock {
    name: String,
    count: Mutex<u32>,
    backend: Arc<dyn WakeLockBackend>,
}

impl WakeLock {
    pub fn new(name: impl Into<String>, backend: Arc<dyn WakeLockBackend>) -> Self {
        Self {
            name: name.into(),
            count: Mutex::new(0),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `n` references, asserting the backend on the 0 -> n transition
    pub fn get_n_locks(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock();
        if *count == 0 {
            if let Err(e) = self.backend.acquire(&self.name) {
                warn!("[WAKELOCK] {}", e);
            }
        }
        *count = count.saturating_add(n);
        trace!("[WAKELOCK] {} +{} -> {}", self.name, n, *count);
    }

    /// Drop `n` references, releasing the backend when the count reaches 0
    pub fn put_n_locks(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock();
        if *count == 0 {
            warn!("[WAKELOCK] {} released while not held", self.name);
            return;
        }
        if n > *count {
            warn!(
                "[WAKELOCK] {} put {} exceeds count {}, clamping",
                self.name, n, *count
            );
        }
        *count = count.saturating_sub(n);
        if *count == 0 {
            if let Err(e) = self.backend.release(&self.name) {
                warn!("[WAKELOCK] {}", e);
            }
        }
        trace!("[WAKELOCK] {} -{} -> {}", self.name, n, *count);
    }

    pub fn ref_count(&self) -> u32 {
        *self.count.lock()
    }

    pub fn is_held(&self) -> bool {
        self.ref_count() > 0
    }
}

impl std::fmt::Debug for WakeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeLock")
            .field("name", &self.name)
            .field("count", &self.ref_count())
            .finish()
    }
}

/// Process-wide table of wake locks keyed by name
///
/// Entries are weak; a lock disappears once the last holder drops it.
pub struct WakeLockRegistry {
    backend: Arc<dyn WakeLockBackend>,
    locks: Mutex<AHashMap<String, Weak<WakeLock>>>,
}

impl WakeLockRegistry {
    pub fn new(backend: Arc<dyn WakeLockBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(AHashMap::new()),
        }
    }

    /// Shared lock for `name`, created on first use
    pub fn get(&self, name: &str) -> Arc<WakeLock> {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(name).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(WakeLock::new(name, Arc::clone(&self.backend)));
        locks.insert(name.to_string(), Arc::downgrade(&lock));
        locks.retain(|_, weak| weak.strong_count() > 0);
        lock
    }

    /// Number of locks with at least one live handle
    pub fn live_locks(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_hal::sim::{RecordingWakeLock, WakeLockEvent};

    #[test]
    fn test_backend_sees_only_edge_transitions() {
        let backend = Arc::new(RecordingWakeLock::new());
        let lock = WakeLock::new("see", backend.clone());

        lock.get_n_locks(1);
        lock.get_n_locks(2);
        lock.put_n_locks(1);
        assert!(backend.is_held("see"));
        assert_eq!(lock.ref_count(), 2);

        lock.put_n_locks(2);
        assert!(!backend.is_held("see"));
        assert_eq!(
            backend.events(),
            vec![
                WakeLockEvent::Acquired("see".to_string()),
                WakeLockEvent::Released("see".to_string())
            ]
        );
    }

    #[test]
    fn test_put_on_unheld_lock_is_ignored() {
        let backend = Arc::new(RecordingWakeLock::new());
        let lock = WakeLock::new("see", backend.clone());
        lock.put_n_locks(1);
        assert_eq!(lock.ref_count(), 0);
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_over_put_clamps_to_zero() {
        let backend = Arc::new(RecordingWakeLock::new());
        let lock = WakeLock::new("see", backend.clone());
        lock.get_n_locks(1);
        lock.put_n_locks(5);
        assert_eq!(lock.ref_count(), 0);
        assert!(!backend.is_held("see"));
    }

    #[test]
    fn test_registry_shares_by_name() {
        let registry = WakeLockRegistry::new(Arc::new(RecordingWakeLock::new()));
        let a = registry.get("see");
        let b = registry.get("see");
        let c = registry.get("other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.live_locks(), 2);

        drop(c);
        assert_eq!(registry.live_locks(), 1);
    }

    #[test]
    fn test_registry_recreates_after_last_drop() {
        let registry = WakeLockRegistry::new(Arc::new(RecordingWakeLock::new()));
        let first = registry.get("see");
        first.get_n_locks(1);
        first.put_n_locks(1);
        drop(first);

        let second = registry.get("see");
        assert_eq!(second.ref_count(), 0);
    }
}
