//! Retry policy: keep retrying a failed entry or give up on it

use crate::config::RetryConfig;
use crate::queue::QueuedEntry;
use std::time::Duration;

/// What to do with an entry after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    DeadLetter(GiveUpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    TooManyAttempts,
    TooOld,
}

impl GiveUpReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GiveUpReason::TooManyAttempts => "max_attempts",
            GiveUpReason::TooOld => "max_age",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    max_age: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<u32>, max_age: Option<Duration>) -> Self {
        Self {
            max_attempts,
            max_age,
        }
    }

    /// Retry forever, like a relay with no dead-letter path
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.max_age())
    }

    /// Decide after `entry.attempts` has been bumped for the latest failure
    pub fn decide(&self, entry: &QueuedEntry) -> Decision {
        if let Some(max) = self.max_attempts {
            if entry.attempts >= max {
                return Decision::DeadLetter(GiveUpReason::TooManyAttempts);
            }
        }
        if let Some(max_age) = self.max_age {
            if entry.age() >= max_age {
                return Decision::DeadLetter(GiveUpReason::TooOld);
            }
        }
        Decision::Retry
    }
}
