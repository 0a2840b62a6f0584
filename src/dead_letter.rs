//! Dead-letter store
//!
//! Keeps a bounded, in-memory record of entries the retry policy gave up on,
//! so an operator can see what never made it upstream. Content bytes are not
//! retained.

use crate::queue::QueuedEntry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Summary of an abandoned entry
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub name: String,
    pub size: usize,
    pub attempts: u32,
    pub first_queued_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl From<&QueuedEntry> for DeadLetter {
    fn from(queued: &QueuedEntry) -> Self {
        Self {
            id: queued.entry.id,
            name: queued.entry.name.clone(),
            size: queued.entry.len(),
            attempts: queued.attempts,
            first_queued_at: queued.first_queued_at,
            dead_lettered_at: Utc::now(),
            last_error: queued.last_error.clone(),
        }
    }
}

/// Bounded FIFO of dead letters; the oldest record is evicted when full
pub struct DeadLetterStore {
    records: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, record: DeadLetter) {
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Entry;

    fn record(name: &str) -> DeadLetter {
        let mut queued = QueuedEntry::new(Entry::new(name, vec![0u8; 4]));
        queued.record_failure("Response status was 500");
        DeadLetter::from(&queued)
    }

    #[test]
    fn test_record_from_queued_entry() {
        let dead = record("a.jpg");
        assert_eq!(dead.name, "a.jpg");
        assert_eq!(dead.size, 4);
        assert_eq!(dead.attempts, 1);
        assert_eq!(dead.last_error.as_deref(), Some("Response status was 500"));
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let store = DeadLetterStore::new(2);
        store.push(record("a.jpg"));
        store.push(record("b.jpg"));
        store.push(record("c.jpg"));

        let names: Vec<String> = store.snapshot().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b.jpg", "c.jpg"]);
    }
}
