//! Bounded ring buffer of recent chat records.
//!
//! Every broadcast record is appended here before fan-out, and a freshly
//! authenticated session receives a copy of the whole buffer, oldest first.

use std::collections::VecDeque;

/// Default number of records kept for replay.
pub const DEFAULT_CAPACITY: usize = 10;

/// A fixed-capacity FIFO of formatted chat records.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<String>,
    capacity: usize,
}

impl HistoryBuffer {
    /// A zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest entry when full.
    pub fn push(&mut self, record: impl Into<String>) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record.into());
    }

    /// Owned copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
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
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
