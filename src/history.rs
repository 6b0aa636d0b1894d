use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded FIFO history of metric samples or log lines. Once the buffer is
/// full the oldest entry is evicted on push; insertion order is the order
/// consumers display and analyze.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
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

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> HistoryBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
    Tech,
}

/// One human-readable line of run output. These are data the engine hands
/// to its caller, not tracing events; they live in a bounded buffer and are
/// cleared when the run resets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub tick: u64,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    pub fn new(tick: u64, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            tick,
            severity,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_push_evicts_oldest_first() {
        let mut buf = HistoryBuffer::new(3);
        for i in 0..5 {
            buf.push(i);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.to_vec(), vec![2, 3, 4]);
        assert_eq!(buf.latest(), Some(&4));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buf = HistoryBuffer::new(10);
        for i in 0..1000 {
            buf.push(i);
            assert!(buf.len() <= 10);
        }
        // Oldest surviving entry is exactly capacity back from the newest.
        assert_eq!(buf.to_vec().first(), Some(&990));
    }

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let mut buf = HistoryBuffer::new(0);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.to_vec(), vec!["b"]);
    }

    #[test]
    fn clear_empties_but_keeps_capacity() {
        let mut buf = HistoryBuffer::new(4);
        buf.push(1);
        buf.push(2);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }
}
