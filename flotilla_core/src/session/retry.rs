//! Retry policy and the attempt sequence consumed by the session loop.
//!
//! [`Attempts`] is a lazy, unbounded sequence of [`Attempt`] tokens. The
//! attempt number increases monotonically for the life of the sequence;
//! [`reset`](Attempts::reset) only restarts the delay schedule, which it
//! does after a confirmed subscription — never merely on a successful
//! receive. Delays grow as `base * factor^n` up to `max`, with optional
//! multiplicative jitter against synchronized retry storms.

use std::time::Duration;

use crate::error::ConfigError;

/// Delay schedule for reconnect attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl RetryPolicy {
    /// Create a policy growing from `base` up to `max`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRetryBase`] when `base` is zero.
    pub fn new(base: Duration, max: Duration) -> Result<Self, ConfigError> {
        if base.is_zero() {
            return Err(ConfigError::ZeroRetryBase);
        }
        Ok(Self {
            base,
            max,
            factor: 2.0,
            jitter: 0.0,
        })
    }

    /// Growth factor per failed attempt (at least 1.0).
    #[must_use]
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    /// Multiplicative jitter in `[0.0, 1.0)`, applied as `±jitter`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.99);
        self
    }

    /// Start a fresh attempt sequence.
    #[must_use]
    pub fn attempts(&self) -> Attempts {
        Attempts {
            policy: *self,
            number: 0,
            delay_step: 0,
        }
    }

    /// Delay before the attempt at `step` positions past the last reset.
    /// Step zero connects immediately.
    fn delay_for_step(&self, step: u32) -> Duration {
        if step == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(step - 1).unwrap_or(i32::MAX);
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);
        // Retries are unbounded, so the exponent eventually outgrows both
        // f64 and Duration; saturate at the cap.
        let delay = if scaled.is_finite() {
            Duration::try_from_secs_f64(scaled).unwrap_or(self.max)
        } else {
            self.max
        };
        let delay = delay.min(self.max);
        if self.jitter > 0.0 {
            use rand::Rng;
            let spread = rand::thread_rng().gen_range(1.0 - self.jitter..1.0 + self.jitter);
            delay.mul_f64(spread)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    /// 100ms base doubling up to 30s, with ±10% jitter.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

/// One token from the attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Monotonically increasing attempt number, starting at 1. Never reset.
    pub number: u64,
    /// How long to wait before making this attempt.
    pub delay: Duration,
}

/// The lazy, unbounded attempt sequence.
#[derive(Debug, Clone)]
pub struct Attempts {
    policy: RetryPolicy,
    number: u64,
    delay_step: u32,
}

impl Attempts {
    /// Produce the next attempt token.
    pub fn next_attempt(&mut self) -> Attempt {
        self.number += 1;
        let delay = self.policy.delay_for_step(self.delay_step);
        self.delay_step = self.delay_step.saturating_add(1);
        Attempt {
            number: self.number,
            delay,
        }
    }

    /// Restart the delay schedule. The attempt number keeps increasing.
    pub fn reset(&mut self) {
        self.delay_step = 0;
    }
}

impl Iterator for Attempts {
    type Item = Attempt;

    fn next(&mut self) -> Option<Attempt> {
        Some(self.next_attempt())
    }
}
