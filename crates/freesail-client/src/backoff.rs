//! Exponential reconnect delay.

use freesail_core::config::TransportConfig;
use std::time::Duration;

/// Reconnect delay that grows by a factor per scheduled attempt, up to a
/// ceiling, and returns to the floor only after a successful connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    factor: f64,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration, factor: f64) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            factor: factor.max(1.0),
            current: floor,
            attempt: 0,
        }
    }

    /// Backoff configured from the transport settings.
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_factor,
        )
    }

    /// Delay for the next reconnect; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = self.current.as_secs_f64() * self.factor;
        self.current = if grown.is_finite() && grown < self.ceiling.as_secs_f64() {
            Duration::from_secs_f64(grown)
        } else {
            self.ceiling
        };
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Delay the next call to [`next_delay`](Self::next_delay) will return.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Reconnects scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}
