//! Reconnect backoff for transports that dial a consumer.

use crate::core::BackoffConfig;
use std::time::{Duration, Instant};

/// Exponential delay between failed connection attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    retry_at: Option<Instant>,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial,
            config,
            retry_at: None,
            failures: 0,
        }
    }

    /// Whether a new attempt may be made now
    pub fn ready(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    /// Time left before the next attempt is allowed
    pub fn remaining(&self) -> Duration {
        self.retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Schedule the next attempt after a failure and return the delay
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);

        if self.failures > 1 {
            let max = self.config.max;
            let grown = (self.current.as_secs_f64() * self.config.multiplier).min(max.as_secs_f64());
            self.current = Duration::try_from_secs_f64(grown).unwrap_or(max).min(max);
        }

        let delay = if self.config.jitter {
            let jitter_ms = rand::random::<f64>() * self.current.as_millis() as f64 * 0.1;
            self.current.saturating_add(Duration::from_millis(jitter_ms as u64))
        } else {
            self.current
        };

        let now = Instant::now();
        self.retry_at = Some(now.checked_add(delay).unwrap_or(now));
        delay
    }

    /// Forget past failures after a successful attempt
    pub fn reset(&mut self) {
        self.current = self.config.initial;
        self.retry_at = None;
        self.failures = 0;
    }
}
