//! # Fibonacci Backoff
//!
//! Progressive requeue delays for Subprocess keys whose reconcile keeps failing
//! with a retryable error. Grows more slowly than exponential backoff so a
//! briefly unavailable API server is retried promptly.
//!
//! Sequence with the default bounds (5s, 300s): 5s, 5s, 10s, 15s, 25s, 40s, 65s, ... 300s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_secs: u64,
    /// Current backoff value in seconds
    current_secs: u64,
    /// Maximum backoff value in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff
    ///
    /// # Arguments
    ///
    /// * `min_secs` - First (and second) backoff duration in seconds
    /// * `max_secs` - Cap for the sequence in seconds
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next, self.max_secs);
        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}

/// Backoff state for one Subprocess key
#[derive(Debug, Clone)]
pub struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn record_error(&mut self) -> Duration {
        self.error_count += 1;
        self.backoff.next_backoff()
    }

    /// Consecutive failures since the last success
    pub fn error_count(&self) -> u32 {
        self.error_count
    }
}
