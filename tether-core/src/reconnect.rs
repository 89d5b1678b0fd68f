//! Reconnection delays with optional exponential backoff.

use crate::options::SocketOptions;
use std::time::Duration;

/// Tracks consecutive reconnection attempts and the delay before each one.
///
/// With `reconnect_delay_max` at or below `reconnect_delay` the delay is
/// fixed. Otherwise it doubles per attempt and is capped at the maximum.
///
/// ```rust
/// use std::time::Duration;
/// use tether_core::options::SocketOptions;
/// use tether_core::reconnect::ReconnectState;
///
/// let secs = Duration::from_secs;
/// let mut state = ReconnectState::new(
///     &SocketOptions::default()
///         .with_reconnect_delay(secs(1))
///         .with_reconnect_delay_max(secs(3)),
/// );
/// let delays: Vec<_> = (0..4).map(|_| state.next_delay()).collect();
/// assert_eq!(delays, [secs(1), secs(2), secs(3), secs(3)]);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    /// Attempts scheduled since the last reset
    attempt: u32,
    current_delay: Duration,
}

impl ReconnectState {
    #[must_use]
    pub const fn new(options: &SocketOptions) -> Self {
        Self {
            base_delay: options.reconnect_delay,
            max_delay: options.reconnect_delay_max,
            max_attempts: options.max_reconnect_attempts,
            attempt: 0,
            current_delay: options.reconnect_delay,
        }
    }

    /// Delay before the next attempt; counts the attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.attempt = self.attempt.saturating_add(1);

        if self.max_delay > self.base_delay {
            self.current_delay = self
                .base_delay
                .saturating_mul(1_u32 << self.attempt.min(16))
                .min(self.max_delay);
        }

        delay
    }

    /// Back to the base delay after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.base_delay;
    }

    /// Attempts scheduled since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns true once the attempt budget is spent.
    #[inline]
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        match self.max_attempts {
            Some(max) => self.attempt >= max,
            None => false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }
}
