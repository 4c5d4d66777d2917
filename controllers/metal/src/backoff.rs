//! # Fibonacci Backoff
//!
//! Requeue delays for hard reconciliation failures. Delays follow the
//! Fibonacci sequence in whole minutes, 1m, 1m, 2m, 3m, 5m, 8m, capped at 10m,
//! and are tracked per resource key so one failing object does not slow
//! down the others. A successful pass resets the key.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Fibonacci delay generator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    prev: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// Sequence starting at `min` (used twice) and capped at `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            prev: Duration::ZERO,
            current: min,
        }
    }

    /// Current delay; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = next.min(self.max);
        delay
    }

    /// Start over from `min`
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }
}

/// Per-resource backoff and consecutive error count
#[derive(Debug, Default)]
pub struct BackoffTracker {
    states: Mutex<HashMap<String, (FibonacciBackoff, u32)>>,
}

impl BackoffTracker {
    /// Record a failure of `key`; returns the delay and the consecutive error count
    pub fn record_failure(&self, key: &str) -> (Duration, u32) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let (backoff, errors) = states.entry(key.to_string()).or_default();
        *errors += 1;
        (backoff.next_delay(), *errors)
    }

    /// Forget the failures of `key` after a successful pass
    pub fn reset(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }
}
