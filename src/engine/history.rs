// SPDX-License-Identifier: MIT

//! Bounded, newest-first history of accepted values

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::value::StateValue;

/// One retained sample
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub val: StateValue,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
}

/// Ring of samples; `entries[0]` is the newest
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front and drop the oldest samples beyond `capacity`
    pub fn record(&mut self, val: StateValue, ts: i64, capacity: usize) {
        self.entries.push_front(HistoryEntry { val, ts });
        self.trim(capacity);
    }

    pub fn trim(&mut self, capacity: usize) {
        self.entries.truncate(capacity);
    }

    /// Whether a sample at `now` is due under the minimum interval.
    /// The first sample is always due.
    pub fn is_due(&self, now: i64, save_interval: u64) -> bool {
        match self.newest() {
            None => true,
            Some(newest) => now.saturating_sub(newest.ts) >= save_interval as i64,
        }
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}
