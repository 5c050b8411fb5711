//! Failure tracking and backoff for the loop that schedules passes.

use std::time::{Duration, Instant};

use rand::Rng;

/// Default interval between passes for a converged object.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default failed passes tolerated per object before it is reported degraded.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default window over which failures are counted.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Exponential backoff between failed passes.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,

    /// Upper bound before jitter.
    pub max: Duration,

    /// Fraction of the delay randomly added or removed (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5 * 60),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay after failure number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let delay = self.base.saturating_mul(factor).min(self.max);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        delay.mul_f64(1.0 + rand::rng().random_range(-jitter..=jitter))
    }
}

/// What the scheduler should do after a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Run the next pass after `delay`.
    After { failures: u32, delay: Duration },

    /// Too many failures inside the window.
    Exhausted { failures: u32 },
}

impl Retry {
    /// Failures counted inside the current window, including this one.
    pub fn failures(&self) -> u32 {
        match self {
            Self::After { failures, .. } | Self::Exhausted { failures } => *failures,
        }
    }
}

/// Failed passes of one cluster object.
///
/// Failures older than the window are forgotten, so an object that fails
/// rarely never becomes exhausted.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u32,
    window: Duration,
    backoff: BackoffPolicy,
    failures: u32,
    first_failure: Option<Instant>,
}

impl RetryTracker {
    pub fn new(max_retries: u32, window: Duration, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            window,
            backoff,
            failures: 0,
            first_failure: None,
        }
    }

    /// Count a failed pass and decide when to retry.
    pub fn record_failure(&mut self) -> Retry {
        let now = Instant::now();
        match self.first_failure {
            Some(first) if now.duration_since(first) <= self.window => {}
            _ => {
                self.failures = 0;
                self.first_failure = Some(now);
            }
        }
        self.failures += 1;

        if self.failures > self.max_retries {
            Retry::Exhausted {
                failures: self.failures,
            }
        } else {
            Retry::After {
                failures: self.failures,
                delay: self.backoff.delay(self.failures - 1),
            }
        }
    }

    /// Forget all failures after a successful pass.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.first_failure = None;
    }
}
