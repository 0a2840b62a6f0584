//! Forwarding worker
//!
//! A single loop that drains the [`EntryQueue`] one entry at a time:
//!
//! ```text
//! WAITING --(queue non-empty)--> backoff sleep --> SENDING
//! SENDING --(200 + JSON)--> delivered, backoff reset
//! SENDING --(transport error)--> requeue, backoff x2
//! SENDING --(non-200)--> requeue, backoff x3
//! ```
//!
//! After each failure the [`RetryPolicy`] may move the entry to the
//! dead-letter store instead of requeueing it. Backoff state lives in the
//! worker; nothing else reads or writes it.

pub mod backoff;
pub mod policy;

pub use backoff::{Backoff, FailureKind};
pub use policy::{Decision, GiveUpReason, RetryPolicy};

use crate::config::{DecodeFailurePolicy, RetryConfig};
use crate::dead_letter::{DeadLetter, DeadLetterStore};
use crate::metrics;
use crate::queue::{EntryQueue, QueuedEntry};
use crate::upstream::{ForwardError, Forwarder, UploadResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of forwarding one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered(UploadResponse),
    /// 200 with an unreadable body, counted as delivered
    DecodeDropped,
    Requeued(FailureKind),
    DeadLettered(GiveUpReason),
}

pub struct Worker {
    queue: Arc<EntryQueue>,
    forwarder: Arc<dyn Forwarder>,
    dead_letters: Arc<DeadLetterStore>,
    backoff: Backoff,
    policy: RetryPolicy,
    on_decode_failure: DecodeFailurePolicy,
    idle_poll: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<EntryQueue>,
        forwarder: Arc<dyn Forwarder>,
        dead_letters: Arc<DeadLetterStore>,
        retry: &RetryConfig,
        idle_poll: Duration,
    ) -> Self {
        Self {
            queue,
            forwarder,
            dead_letters,
            backoff: Backoff::new(retry.base_delay(), retry.max_delay()),
            policy: RetryPolicy::from_config(retry),
            on_decode_failure: retry.on_decode_failure,
            idle_poll,
        }
    }

    /// Replace the retry policy built from configuration
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Start the loop on the runtime. It never finishes on its own.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(idle_poll_ms = self.idle_poll.as_millis() as u64, "Forwarding worker started");
        loop {
            if self.step().await.is_none() {
                tokio::time::sleep(self.idle_poll).await;
            }
        }
    }

    /// Forward the oldest entry, if there is one.
    ///
    /// Sleeps the current backoff first. Returns `None` without sleeping when
    /// the queue is empty.
    pub async fn step(&mut self) -> Option<Outcome> {
        if self.queue.is_empty() {
            return None;
        }

        let delay = self.backoff.next_sleep();
        metrics::set_backoff(delay);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before next upload");
            tokio::time::sleep(delay).await;
        }

        let queued = self.queue.pop()?;
        metrics::set_queue_depth(self.queue.len());
        Some(self.process(queued).await)
    }

    async fn process(&mut self, queued: QueuedEntry) -> Outcome {
        let started = Instant::now();
        let result = self.forwarder.forward(&queued.entry).await;
        metrics::record_forward_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                info!(
                    entry.id = %queued.entry.id,
                    attempts = queued.attempts + 1,
                    uuid = %response.uuid,
                    url = %response.url,
                    "Uploaded as {}",
                    response.name
                );
                self.backoff.reset();
                self.queue.release();
                metrics::record_forward_attempt("delivered");
                Outcome::Delivered(response)
            }
            Err(ForwardError::Decode(e)) => {
                error!(entry.name = %queued.entry.name, "Error unmarshalling response : {}", e);
                match self.on_decode_failure {
                    DecodeFailurePolicy::Drop => {
                        self.queue.release();
                        metrics::record_forward_attempt("decode_dropped");
                        Outcome::DecodeDropped
                    }
                    DecodeFailurePolicy::Retry => {
                        self.fail(queued, FailureKind::Rejected, format!("undecodable response: {}", e))
                    }
                }
            }
            Err(e @ ForwardError::Status(_)) => self.fail(queued, FailureKind::Rejected, e.to_string()),
            Err(e) => self.fail(queued, FailureKind::Transport, e.to_string()),
        }
    }

    fn fail(&mut self, mut queued: QueuedEntry, kind: FailureKind, message: String) -> Outcome {
        queued.record_failure(message.clone());
        self.backoff.on_failure(kind);
        metrics::record_forward_attempt(kind.as_str());

        match self.policy.decide(&queued) {
            Decision::Retry => {
                warn!(
                    entry.id = %queued.entry.id,
                    attempts = queued.attempts,
                    backoff_ms = self.backoff.current().as_millis() as u64,
                    "Error uploading file {} : {}",
                    queued.entry.name,
                    message
                );
                self.queue.requeue(queued);
                metrics::set_queue_depth(self.queue.len());
                Outcome::Requeued(kind)
            }
            Decision::DeadLetter(reason) => {
                error!(
                    entry.id = %queued.entry.id,
                    attempts = queued.attempts,
                    reason = reason.as_str(),
                    "Giving up on file {} : {}",
                    queued.entry.name,
                    message
                );
                self.dead_letters.push(DeadLetter::from(&queued));
                self.queue.release();
                metrics::record_dead_letter(reason.as_str());
                Outcome::DeadLettered(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Entry;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays a fixed script of results and remembers what it was sent
    struct ScriptedForwarder {
        script: Mutex<VecDeque<Result<UploadResponse, ForwardError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedForwarder {
        fn new(script: Vec<Result<UploadResponse, ForwardError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward(&self, entry: &Entry) -> Result<UploadResponse, ForwardError> {
            self.seen.lock().push(entry.name.clone());
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ForwardError::Transport("script exhausted".into())))
        }
    }

    fn ok(name: &str) -> Result<UploadResponse, ForwardError> {
        Ok(UploadResponse {
            name: name.into(),
            uuid: "u1".into(),
            url: "http://x/u1".into(),
        })
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            base_delay_ms: 1,
            max_delay_secs: 1,
            max_attempts: None,
            ..Default::default()
        }
    }

    fn worker_with(
        forwarder: Arc<ScriptedForwarder>,
        retry: &RetryConfig,
    ) -> (Worker, Arc<EntryQueue>, Arc<DeadLetterStore>) {
        let queue = Arc::new(EntryQueue::new(8));
        let dead_letters = Arc::new(DeadLetterStore::new(8));
        let worker = Worker::new(
            queue.clone(),
            forwarder,
            dead_letters.clone(),
            retry,
            Duration::from_millis(1),
        );
        (worker, queue, dead_letters)
    }

    #[tokio::test]
    async fn test_step_on_empty_queue_returns_none() {
        let forwarder = ScriptedForwarder::new(vec![]);
        let (mut worker, _queue, _) = worker_with(forwarder.clone(), &fast_retry());
        assert!(worker.step().await.is_none());
        assert!(forwarder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_success_resets_backoff_and_frees_slot() {
        let forwarder = ScriptedForwarder::new(vec![
            Err(ForwardError::Transport("refused".into())),
            ok("srv-a.jpg"),
        ]);
        let (mut worker, queue, _) = worker_with(forwarder, &fast_retry());
        queue.push(Entry::new("a.jpg", vec![0u8; 10])).await.unwrap();

        assert_eq!(
            worker.step().await,
            Some(Outcome::Requeued(FailureKind::Transport))
        );
        assert_eq!(worker.backoff().current(), Duration::from_millis(1));

        let outcome = worker.step().await.unwrap();
        assert!(matches!(outcome, Outcome::Delivered(ref r) if r.name == "srv-a.jpg"));
        assert_eq!(worker.backoff().current(), Duration::ZERO);
        assert!(queue.is_empty());
        assert_eq!(queue.available_slots(), queue.capacity());
    }

    #[tokio::test]
    async fn test_retried_entry_goes_to_the_back() {
        let forwarder = ScriptedForwarder::new(vec![
            Err(ForwardError::Status(503)),
            ok("srv-b.jpg"),
            ok("srv-a.jpg"),
        ]);
        let (mut worker, queue, _) = worker_with(forwarder.clone(), &fast_retry());
        queue.push(Entry::new("a.jpg", "1")).await.unwrap();
        queue.push(Entry::new("b.jpg", "2")).await.unwrap();

        for _ in 0..3 {
            worker.step().await.unwrap();
        }
        assert_eq!(*forwarder.seen.lock(), vec!["a.jpg", "b.jpg", "a.jpg"]);
    }

    #[tokio::test]
    async fn test_decode_failure_dropped_by_default() {
        let forwarder = ScriptedForwarder::new(vec![Err(ForwardError::Decode("eof".into()))]);
        let (mut worker, queue, _) = worker_with(forwarder, &fast_retry());
        queue.push(Entry::new("a.jpg", "1")).await.unwrap();

        assert_eq!(worker.step().await, Some(Outcome::DecodeDropped));
        assert!(queue.is_empty());
        assert_eq!(worker.backoff().current(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_decode_failure_can_be_retried() {
        let forwarder = ScriptedForwarder::new(vec![Err(ForwardError::Decode("eof".into()))]);
        let retry = RetryConfig {
            on_decode_failure: DecodeFailurePolicy::Retry,
            ..fast_retry()
        };
        let (mut worker, queue, _) = worker_with(forwarder, &retry);
        queue.push(Entry::new("a.jpg", "1")).await.unwrap();

        assert_eq!(
            worker.step().await,
            Some(Outcome::Requeued(FailureKind::Rejected))
        );
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letters_after_max_attempts() {
        let forwarder = ScriptedForwarder::new(vec![
            Err(ForwardError::Status(500)),
            Err(ForwardError::Status(500)),
        ]);
        let retry = RetryConfig {
            max_attempts: Some(2),
            ..fast_retry()
        };
        let (mut worker, queue, dead_letters) = worker_with(forwarder, &retry);
        queue.push(Entry::new("a.jpg", "1")).await.unwrap();

        assert_eq!(
            worker.step().await,
            Some(Outcome::Requeued(FailureKind::Rejected))
        );
        assert_eq!(
            worker.step().await,
            Some(Outcome::DeadLettered(GiveUpReason::TooManyAttempts))
        );
        assert!(queue.is_empty());
        assert_eq!(queue.available_slots(), queue.capacity());

        let records = dead_letters.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempts, 2);
        assert_eq!(records[0].last_error.as_deref(), Some("Response status was 500"));
    }

    #[tokio::test]
    async fn test_rejections_triple_the_backoff() {
        let forwarder = ScriptedForwarder::new(vec![
            Err(ForwardError::Status(500)),
            Err(ForwardError::Status(500)),
            Err(ForwardError::Status(500)),
        ]);
        let (mut worker, queue, _) = worker_with(forwarder, &fast_retry());
        queue.push(Entry::new("a.jpg", "1")).await.unwrap();

        let mut delays = Vec::new();
        for _ in 0..3 {
            worker.step().await.unwrap();
            delays.push(worker.backoff().current().as_millis());
        }
        assert_eq!(delays, vec![1, 3, 9]);
    }
}
