//! Upload queue
//!
//! A bounded FIFO shared between the ingress handlers (producers) and the
//! forwarding worker (single consumer).
//!
//! Capacity is tracked with a semaphore of slots. A producer takes a slot when
//! it pushes; the slot stays taken while the entry waits in the queue *and*
//! while the worker holds it in flight. The worker gives the slot back with
//! [`EntryQueue::release`] once it is done with an entry, or keeps it when it
//! calls [`EntryQueue::requeue`]. A retry therefore never waits for space.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Queue errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue full: no slot freed within {0:?}")]
    Full(Duration),

    #[error("Queue closed")]
    Closed,
}

/// One accepted upload awaiting forwarding
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: Uuid,
    pub name: String,
    pub content: Bytes,
}

impl Entry {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// An entry plus its delivery bookkeeping
#[derive(Debug, Clone)]
pub struct QueuedEntry {
    pub entry: Entry,
    /// Failed forwarding attempts so far
    pub attempts: u32,
    pub first_queued: Instant,
    pub first_queued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl QueuedEntry {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            attempts: 0,
            first_queued: Instant::now(),
            first_queued_at: Utc::now(),
            last_error: None,
        }
    }

    /// Time since the entry was first accepted
    pub fn age(&self) -> Duration {
        self.first_queued.elapsed()
    }

    /// Record a failed attempt
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
    }
}

/// Bounded FIFO of pending uploads
pub struct EntryQueue {
    items: Mutex<VecDeque<QueuedEntry>>,
    slots: Semaphore,
    capacity: usize,
}

impl EntryQueue {
    /// Create a queue holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: Semaphore::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries waiting to be forwarded (excludes the one in flight)
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Slots not currently taken by a waiting or in-flight entry
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Push an entry, waiting as long as it takes for a free slot
    pub async fn push(&self, entry: Entry) -> Result<(), QueueError> {
        let permit = self.slots.acquire().await.map_err(|_| QueueError::Closed)?;
        permit.forget();
        self.items.lock().push_back(QueuedEntry::new(entry));
        Ok(())
    }

    /// Push an entry, giving up after `timeout` if no slot frees up
    pub async fn push_timeout(&self, entry: Entry, timeout: Duration) -> Result<(), QueueError> {
        match tokio::time::timeout(timeout, self.slots.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.items.lock().push_back(QueuedEntry::new(entry));
                Ok(())
            }
            Ok(Err(_)) => Err(QueueError::Closed),
            Err(_) => Err(QueueError::Full(timeout)),
        }
    }

    /// Take the oldest entry, if any. Its slot stays taken.
    pub fn pop(&self) -> Option<QueuedEntry> {
        self.items.lock().pop_front()
    }

    /// Put an in-flight entry at the back of the queue, reusing its slot
    pub fn requeue(&self, entry: QueuedEntry) {
        self.items.lock().push_back(entry);
    }

    /// Give back the slot of an in-flight entry that will not be requeued
    pub fn release(&self) {
        self.slots.add_permits(1);
    }

    /// Stop accepting new entries; pending pushes fail with `Closed`
    pub fn close(&self) {
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_pop_is_fifo() {
        let queue = EntryQueue::new(4);
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            queue.push(Entry::new(name, vec![0u8; 3])).await.unwrap();
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|q| q.entry.name)
            .collect();
        assert_eq!(order, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[tokio::test]
    async fn test_in_flight_entry_holds_its_slot() {
        let queue = EntryQueue::new(1);
        queue.push(Entry::new("a.jpg", "x")).await.unwrap();

        let in_flight = queue.pop().unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.available_slots(), 0);

        queue.requeue(in_flight);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.available_slots(), 0);

        queue.pop().unwrap();
        queue.release();
        assert_eq!(queue.available_slots(), 1);
    }

    #[test]
    fn test_push_waits_for_a_released_slot() {
        let queue = EntryQueue::new(1);
        tokio_test::block_on(queue.push(Entry::new("a.jpg", "x"))).unwrap();

        let mut blocked = tokio_test::task::spawn(queue.push(Entry::new("b.jpg", "y")));
        tokio_test::assert_pending!(blocked.poll());

        queue.pop().unwrap();
        tokio_test::assert_pending!(blocked.poll());

        queue.release();
        assert!(blocked.is_woken());
        tokio_test::assert_ready_ok!(blocked.poll());
        drop(blocked);

        assert_eq!(queue.pop().unwrap().entry.name, "b.jpg");
    }

    #[tokio::test]
    async fn test_push_timeout_when_full() {
        let queue = EntryQueue::new(1);
        queue.push(Entry::new("a.jpg", "x")).await.unwrap();

        let result = queue
            .push_timeout(Entry::new("b.jpg", "y"), Duration::from_millis(20))
            .await;
        assert_eq!(result, Err(QueueError::Full(Duration::from_millis(20))));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_pushes() {
        let queue = EntryQueue::new(2);
        queue.close();
        let result = queue.push(Entry::new("a.jpg", "x")).await;
        assert_eq!(result, Err(QueueError::Closed));
    }

    #[test]
    fn test_record_failure_counts_attempts() {
        let mut queued = QueuedEntry::new(Entry::new("a.jpg", "x"));
        queued.record_failure("connection refused");
        queued.record_failure("status 500");
        assert_eq!(queued.attempts, 2);
        assert_eq!(queued.last_error.as_deref(), Some("status 500"));
    }
}
