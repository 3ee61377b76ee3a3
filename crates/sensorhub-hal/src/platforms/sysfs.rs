// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel interfaces exposed through sysfs

use crate::{HalError, RestartTrigger, Result, WakeLockBackend};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

fn write_node(path: &Path, value: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(value.as_bytes())
}

/// `/sys/power/wake_lock` style wake assertion
#[derive(Debug, Clone)]
pub struct SysfsWakeLock {
    lock_path: PathBuf,
    unlock_path: PathBuf,
}

impl SysfsWakeLock {
    pub fn new(lock_path: impl Into<PathBuf>, unlock_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
            unlock_path: unlock_path.into(),
        }
    }
}

impl Default for SysfsWakeLock {
    fn default() -> Self {
        Self::new("/sys/power/wake_lock", "/sys/power/wake_unlock")
    }
}

impl WakeLockBackend for SysfsWakeLock {
    fn acquire(&self, name: &str) -> Result<()> {
        write_node(&self.lock_path, name).map_err(|source| HalError::WakeLock {
            name: name.to_string(),
            op: "acquire",
            source,
        })?;
        debug!("[WAKELOCK] acquired {}", name);
        Ok(())
    }

    fn release(&self, name: &str) -> Result<()> {
        write_node(&self.unlock_path, name).map_err(|source| HalError::WakeLock {
            name: name.to_string(),
            op: "release",
            source,
        })?;
        debug!("[WAKELOCK] released {}", name);
        Ok(())
    }
}

/// Writes `1` to a subsystem-restart node
#[derive(Debug, Clone)]
pub struct SysfsRestartTrigger {
    path: PathBuf,
}

impl SysfsRestartTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RestartTrigger for SysfsRestartTrigger {
    fn trigger_restart(&self, reason: &str) -> Result<()> {
        error!("[RESTART] requesting coprocessor restart: {}", reason);
        write_node(&self.path, "1")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wake_lock_writes_name() {
        let dir = tempdir().unwrap();
        let lock = dir.path().join("wake_lock");
        let unlock = dir.path().join("wake_unlock");
        std::fs::write(&lock, "").unwrap();
        std::fs::write(&unlock, "").unwrap();

        let backend = SysfsWakeLock::new(&lock, &unlock);
        backend.acquire("sensorhub_see").unwrap();
        backend.release("sensorhub_see").unwrap();

        assert_eq!(std::fs::read_to_string(&lock).unwrap(), "sensorhub_see");
        assert_eq!(std::fs::read_to_string(&unlock).unwrap(), "sensorhub_see");
    }

    #[test]
    fn test_missing_node_reports_wake_lock_error() {
        let backend = SysfsWakeLock::new("/nonexistent/wake_lock", "/nonexistent/wake_unlock");
        let err = backend.acquire("x").unwrap_err();
        assert!(matches!(err, HalError::WakeLock { op: "acquire", .. }));
    }

    #[test]
    fn test_restart_trigger_writes_one() {
        let dir = tempdir().unwrap();
        let node = dir.path().join("ssr");
        std::fs::write(&node, "").unwrap();

        SysfsRestartTrigger::new(&node).trigger_restart("test").unwrap();
        assert_eq!(std::fs::read_to_string(&node).unwrap(), "1");
    }
}
