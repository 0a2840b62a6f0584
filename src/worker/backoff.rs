//! Adaptive send pacing
//!
//! Owned by the worker. Transport failures double the delay, rejected uploads
//! triple it, and a delivered upload resets it. The stored delay may grow past
//! the cap after a failure; it is clamped only when the worker sleeps.

use std::time::Duration;

/// Why an attempt failed, as far as pacing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection, DNS or timeout failure
    Transport,
    /// Upstream answered with a non-200 status
    Rejected,
}

impl FailureKind {
    fn factor(self) -> u32 {
        match self {
            FailureKind::Transport => 2,
            FailureKind::Rejected => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: Duration::ZERO,
            base,
            max,
        }
    }

    /// Stored delay, possibly above the cap
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Clamp the stored delay to the cap and return what should be slept
    pub fn next_sleep(&mut self) -> Duration {
        self.current = self.current.min(self.max);
        self.current
    }

    pub fn on_failure(&mut self, kind: FailureKind) {
        self.current = if self.current.is_zero() {
            self.base
        } else {
            self.current.saturating_mul(kind.factor())
        };
    }

    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(1);
    const CAP: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn test_starts_at_zero() {
        let mut backoff = Backoff::new(BASE, CAP);
        assert_eq!(backoff.next_sleep(), Duration::ZERO);
    }

    #[test]
    fn test_transport_failures_double() {
        let mut backoff = Backoff::new(BASE, CAP);
        let mut seen = Vec::new();
        for _ in 0..4 {
            backoff.on_failure(FailureKind::Transport);
            seen.push(backoff.current().as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_rejections_triple() {
        let mut backoff = Backoff::new(BASE, CAP);
        for _ in 0..3 {
            backoff.on_failure(FailureKind::Rejected);
        }
        assert_eq!(backoff.next_sleep(), (BASE * 9).min(CAP));
    }

    #[test]
    fn test_stored_delay_exceeds_cap_but_sleep_is_clamped() {
        let cap = Duration::from_secs(5);
        let mut backoff = Backoff::new(BASE, cap);
        backoff.on_failure(FailureKind::Rejected); // 1
        backoff.on_failure(FailureKind::Rejected); // 3
        backoff.on_failure(FailureKind::Rejected); // 9
        assert_eq!(backoff.current(), Duration::from_secs(9));
        assert_eq!(backoff.next_sleep(), cap);
        assert_eq!(backoff.current(), cap);
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = Backoff::new(BASE, CAP);
        backoff.on_failure(FailureKind::Transport);
        backoff.on_failure(FailureKind::Rejected);
        backoff.reset();
        assert_eq!(backoff.next_sleep(), Duration::ZERO);
    }

    #[test]
    fn test_growth_saturates() {
        let mut backoff = Backoff::new(BASE, Duration::MAX);
        for _ in 0..200 {
            backoff.on_failure(FailureKind::Rejected);
        }
        assert_eq!(backoff.current(), Duration::MAX);
    }
}
