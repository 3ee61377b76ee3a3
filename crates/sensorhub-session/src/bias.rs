// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Time-ordered calibration bias list
//!
//! Biases arrive far less often than samples, so the list stays short and a
//! lookup prunes everything older than the entry it returns.

use crate::types::CalibrationBias;
use std::collections::VecDeque;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BiasList {
    entries: VecDeque<CalibrationBias>,
    capacity: usize,
    /// Timestamp of the last bias handed to a sample
    last_consumed: Option<u64>,
}

impl BiasList {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            last_consumed: None,
        }
    }

    /// Insert in timestamp order; returns false if the bias was discarded
    ///
    /// A bias older than one already applied can never be selected again.
    pub fn push(&mut self, bias: CalibrationBias) -> bool {
        if let Some(consumed) = self.last_consumed {
            if bias.timestamp < consumed {
                debug!(
                    "[BIAS] discarding bias at {} older than applied {}",
                    bias.timestamp, consumed
                );
                return false;
            }
        }

        let at = self
            .entries
            .partition_point(|entry| entry.timestamp <= bias.timestamp);
        self.entries.insert(at, bias);

        if self.entries.len() > self.capacity {
            if let Some(dropped) = self.entries.pop_front() {
                warn!(
                    "[BIAS] list full ({}), dropping bias at {}",
                    self.capacity, dropped.timestamp
                );
            }
        }
        true
    }

    /// Newest bias with `timestamp <= ts`, pruning strictly older entries
    pub fn lookup(&mut self, ts: u64) -> Option<CalibrationBias> {
        let newer_start = self.entries.partition_point(|entry| entry.timestamp <= ts);
        if newer_start == 0 {
            return None;
        }
        let matched = self.entries[newer_start - 1];
        let older = self
            .entries
            .partition_point(|entry| entry.timestamp < matched.timestamp);
        self.entries.drain(..older);
        self.last_consumed = Some(matched.timestamp);
        Some(matched)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.entries.iter().map(|entry| entry.timestamp).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_consumed = None;
    }
}
