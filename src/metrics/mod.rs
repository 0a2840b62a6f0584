//! Metrics module
//!
//! Provides Prometheus metrics for ingress and forwarding.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};
use std::time::Duration;

lazy_static! {
    // Ingress metrics
    pub static ref ENTRIES_QUEUED: Counter = register_counter!(
        "relay_entries_queued_total",
        "Uploads accepted into the queue"
    ).unwrap();

    pub static ref QUEUED_BYTES: Counter = register_counter!(
        "relay_queued_bytes_total",
        "Bytes accepted into the queue"
    ).unwrap();

    pub static ref INGRESS_REJECTED: CounterVec = register_counter_vec!(
        "relay_ingress_rejected_total",
        "Uploads refused at ingress",
        &["reason"]  // "missing_name" or "queue_full"
    ).unwrap();

    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "relay_queue_depth",
        "Entries waiting to be forwarded"
    ).unwrap();

    // Forwarding metrics
    pub static ref FORWARD_ATTEMPTS: CounterVec = register_counter_vec!(
        "relay_forward_attempts_total",
        "Forwarding attempts by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref FORWARD_DURATION: Histogram = register_histogram!(
        "relay_forward_duration_seconds",
        "Upstream upload duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    pub static ref BACKOFF_SECONDS: Gauge = register_gauge!(
        "relay_backoff_seconds",
        "Delay applied before the most recent upload attempt"
    ).unwrap();

    pub static ref DEAD_LETTERS: CounterVec = register_counter_vec!(
        "relay_dead_letters_total",
        "Entries abandoned by the retry policy",
        &["reason"]
    ).unwrap();
}

/// Record an accepted upload
pub fn record_entry_queued(bytes: usize) {
    ENTRIES_QUEUED.inc();
    QUEUED_BYTES.inc_by(bytes as f64);
}

/// Record an upload refused at ingress
pub fn record_ingress_rejected(reason: &str) {
    INGRESS_REJECTED.with_label_values(&[reason]).inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

/// Record one forwarding attempt
///
/// # Arguments
/// * `outcome` - "delivered", "decode_dropped", "transport" or "rejected"
pub fn record_forward_attempt(outcome: &str) {
    FORWARD_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn record_forward_duration(duration_secs: f64) {
    FORWARD_DURATION.observe(duration_secs);
}

pub fn set_backoff(delay: Duration) {
    BACKOFF_SECONDS.set(delay.as_secs_f64());
}

pub fn record_dead_letter(reason: &str) {
    DEAD_LETTERS.with_label_values(&[reason]).inc();
}
