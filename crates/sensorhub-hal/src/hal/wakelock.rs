// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::Result;

/// Kernel wake assertion keyed by name
///
/// Reference counting happens above this trait; a backend only sees the
/// 0 -> 1 and 1 -> 0 transitions.
pub trait WakeLockBackend: Send + Sync {
    fn acquire(&self, name: &str) -> Result<()>;
    fn release(&self, name: &str) -> Result<()>;
}
