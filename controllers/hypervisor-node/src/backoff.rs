//! # Fibonacci Backoff
//!
//! Progressive delay between registration attempts. Grows more slowly than
//! exponential backoff so a fleet of nodes retrying against MAAS at once does
//! not pile up behind long waits.
//!
//! Sequence with the registration defaults: 5s, 5s, 10s, 15s, 25s, 40s, 60s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_seconds`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_seconds: u64,
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff
    ///
    /// # Arguments
    ///
    /// * `min_seconds` - Used for the first two values
    /// * `max_seconds` - Caps the sequence
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Backoff used between registration attempts
    #[must_use]
    pub fn for_registration() -> Self {
        Self::new(5, 60)
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;

        let next = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);

        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_backoff_sequence() {
        let mut backoff = FibonacciBackoff::for_registration();

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 15);
        assert_eq!(backoff.next_backoff_seconds(), 25);
        assert_eq!(backoff.next_backoff_seconds(), 40);
        assert_eq!(backoff.next_backoff_seconds(), 60); // max
        // Next would be 100s, capped
        assert_eq!(backoff.next_backoff_seconds(), 60);
    }

    #[test]
    fn test_next_backoff_as_duration() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    }
}
