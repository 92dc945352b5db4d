//! Retry policy for partially rejected batches
//!
//! The retry unit is a shrinking set of records: each attempt resubmits only
//! what the sink rejected last time.

use crate::types::Record;
use std::time::Duration;

/// Default number of retries after the first submission
pub const DEFAULT_MAX_RETRIES: u32 = 40;

/// Default fixed delay between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1500);

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not including the initial attempt)
    pub max_retries: u32,
    /// Delay before each retry
    pub retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a fixed delay
    pub fn fixed(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set max retries (builder pattern)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set retry interval (builder pattern)
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Whether a failed attempt (0-indexed) may be followed by another one
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Upper bound on submissions per chunk
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Records still to be delivered, and which attempt is about to submit them
///
/// Always holds the caller's original records, never formatted payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    pub records: Vec<Record>,
    pub attempt: u32,
}

impl RetryState {
    /// State for the first submission of a chunk
    pub fn initial(records: Vec<Record>) -> Self {
        Self {
            records,
            attempt: 0,
        }
    }

    /// State for the next attempt, carrying only the leftovers
    pub fn next(&self, leftovers: Vec<Record>) -> Self {
        Self {
            records: leftovers,
            attempt: self.attempt + 1,
        }
    }
}
