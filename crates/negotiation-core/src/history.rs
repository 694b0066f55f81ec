//! Bounded undo history of instrument sequences.
//!
//! Snapshots own deep copies of the instruments they capture, so later edits
//! to the live sequence can never alter history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::DEFAULT_MAX_UNDO_DEPTH;
use crate::instrument::PaymentInstrument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// What triggered the capture, e.g. "edit card #2 to 8000"
    pub label: String,
    pub instruments: Vec<PaymentInstrument>,
}

#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<Snapshot>,
    capacity: usize,
    next_id: u64,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_UNDO_DEPTH)
    }
}

impl SnapshotHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            next_id: 1,
        }
    }

    /// Push a copy of `instruments`, evicting the oldest snapshot when full.
    pub fn capture(
        &mut self,
        label: impl Into<String>,
        instruments: &[PaymentInstrument],
        timestamp: DateTime<Utc>,
    ) {
        let snapshot = Snapshot {
            id: self.next_id,
            timestamp,
            label: label.into(),
            instruments: instruments.to_vec(),
        };
        self.next_id += 1;
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Most recent snapshot, or `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Snapshot> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Labels from newest to oldest.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().rev().map(|s| s.label.as_str()).collect()
    }
}
