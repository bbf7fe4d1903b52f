//! Respawn throttling for a crash-looping worker.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::BackoffConfig;

/// Bounded exponential delay between consecutive respawn attempts.
///
/// The first failure of a run respawns on the next poll; the second waits
/// `initial`, the third `2 * initial`, and so on up to `max`. There is no
/// attempt limit.
#[derive(Debug, Clone)]
pub struct RespawnBackoff {
    initial: Duration,
    max: Duration,
    reset_after: Duration,
    consecutive_failures: u32,
    not_before: Option<Instant>,
}

impl RespawnBackoff {
    /// Create a backoff policy.
    #[must_use]
    pub fn new(initial: Duration, max: Duration, reset_after: Duration) -> Self {
        Self {
            initial,
            max,
            reset_after,
            consecutive_failures: 0,
            not_before: None,
        }
    }

    /// Build from the `[backoff]` section.
    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_seconds),
            Duration::from_secs(config.max_seconds),
            Duration::from_secs(config.reset_after_seconds),
        )
    }

    /// Failures recorded since the last reset.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay imposed after the `failures`-th consecutive failure.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return Duration::ZERO;
        }
        let factor = 2_u32.checked_pow(failures - 2).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Record a crash or spawn failure and return the delay now in force.
    ///
    /// `uptime` is how long the crashed worker ran; a worker that stayed up
    /// for at least `reset_after` starts a fresh failure run.
    pub fn record_failure(&mut self, now: Instant, uptime: Option<Duration>) -> Duration {
        if uptime.is_some_and(|up| up >= self.reset_after) {
            self.consecutive_failures = 0;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let delay = self.delay_for(self.consecutive_failures);
        self.not_before = if delay.is_zero() {
            None
        } else {
            Some(now + delay)
        };
        delay
    }

    /// Forget all failures.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.not_before = None;
    }

    /// Time left before a spawn is allowed, if any.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.not_before
            .filter(|&deadline| deadline > now)
            .map(|deadline| deadline - now)
    }
}
