// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::Result;

/// Requests a full coprocessor subsystem restart
///
/// Used when the transport is wedged and in-process recovery is not possible.
pub trait RestartTrigger: Send + Sync {
    fn trigger_restart(&self, reason: &str) -> Result<()>;
}
