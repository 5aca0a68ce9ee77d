//! Capped exponential backoff.

use std::time::Duration;
use tokio::time::Instant;

/// Retry schedule: `base`, `2 * base`, `4 * base`, ... capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    /// Consecutive failed attempts.
    attempts: u32,
    /// Earliest time of the next attempt.
    next_attempt: Instant,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
            next_attempt: Instant::now(),
        }
    }

    /// Current delay before the next attempt.
    pub fn delay(&self) -> Duration {
        let factor = 1u32 << self.attempts.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Record a failed attempt and push the next one out.
    pub fn mark_failed(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.next_attempt = Instant::now() + self.delay();
    }

    /// Whether the next attempt is due.
    pub fn can_attempt(&self) -> bool {
        Instant::now() >= self.next_attempt
    }

    /// Reset after success.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_attempt = Instant::now();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
