//! Reconnection Policy
//!
//! Bounded retry with linearly increasing delay. Attempt `k` (1-based)
//! waits `k * base_delay`; once `max_attempts` attempts have been handed
//! out the strategy is exhausted until [`ReconnectionStrategy::reset`].

use crate::config::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY};
use std::time::Duration;

/// Reconnection strategy with linear backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionStrategy {
    /// Attempts handed out since the last reset
    pub attempt: u32,
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Delay unit
    pub base_delay: Duration,
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY)
    }
}

impl ReconnectionStrategy {
    /// Create a new reconnection strategy
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
        }
    }

    /// Reset the strategy
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Check if more attempts are available
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Claim the next attempt, returning its number and delay
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if !self.has_attempts_remaining() {
            return None;
        }

        self.attempt += 1;
        Some((self.attempt, self.base_delay * self.attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let mut strategy = ReconnectionStrategy::default();

        assert_eq!(strategy.next_delay(), Some((1, Duration::from_millis(2_000))));
        assert_eq!(strategy.next_delay(), Some((2, Duration::from_millis(4_000))));
        assert_eq!(strategy.next_delay(), Some((3, Duration::from_millis(6_000))));
        assert_eq!(strategy.next_delay(), None);
        assert!(!strategy.has_attempts_remaining());
    }

    #[test]
    fn test_reset() {
        let mut strategy = ReconnectionStrategy::new(1, Duration::from_secs(1));
        assert!(strategy.next_delay().is_some());
        assert!(strategy.next_delay().is_none());

        strategy.reset();
        assert_eq!(strategy.attempt, 0);
        assert_eq!(strategy.next_delay(), Some((1, Duration::from_secs(1))));
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let mut strategy = ReconnectionStrategy::new(0, Duration::from_secs(1));
        assert_eq!(strategy.next_delay(), None);
    }
}
