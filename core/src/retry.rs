//! Retry policy for settlement attempts: capped exponential backoff with
//! multiplicative jitter, applied before every attempt after the first.

use crate::rng::JitterRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_min: 0.8,
            jitter_max: 1.2,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before attempt `attempt` (0-based):
    /// `min(max_delay, base_delay * 2^attempt)`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Jittered delay before attempt `attempt`.
    pub fn backoff(&self, attempt: u32, rng: &mut JitterRng) -> Duration {
        let factor = rng.multiplier(self.jitter_min, self.jitter_max);
        self.base_backoff(attempt).mul_f64(factor)
    }
}

/// Blocking wait between attempts. Not interruptible.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for std::sync::Arc<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
