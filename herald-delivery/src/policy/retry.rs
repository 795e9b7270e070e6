//! Retry policy for transient send failures.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How transient failures of a single recipient are retried.
///
/// Retries happen in-place inside the worker that owns the recipient; the
/// backoff sleep only suspends that worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt before a recipient is recorded as
    /// `transient_exhausted`.
    ///
    /// Default: 2
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (in milliseconds).
    ///
    /// The delay before retry `n` (1-indexed) is `base * 2^(n - 1)`.
    ///
    /// Default: 200 ms
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on a single backoff delay (in milliseconds).
    ///
    /// Default: 5000 ms
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor for randomizing delays, within ±`jitter_factor`.
    ///
    /// Default: 0.1 (±10%)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Check if another attempt is allowed after `retries` retries.
    #[must_use]
    pub const fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Delay before retry number `retry` (1-indexed).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        calculate_backoff(
            retry,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
        )
    }
}

/// Exponential backoff with jitter
///
/// `delay = min(base * 2^(retry - 1), max_delay) * (1 ± jitter)`
fn calculate_backoff(
    retry: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> Duration {
    let exponent = retry.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_ms
    } else {
        let multiplier = 1u64 << exponent;
        base_delay_ms.saturating_mul(multiplier).min(max_delay_ms)
    };

    // Anything outside 0..=1 (NaN included) would make the jitter range invalid
    let jitter_factor = if jitter_factor.is_finite() {
        jitter_factor.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if jitter_factor <= 0.0 || delay == 0 {
        return Duration::from_millis(delay);
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let jitter_range = (delay as f64) * jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    Duration::from_millis(jittered)
}

mod defaults {
    pub const fn max_retries() -> u32 {
        2
    }

    pub const fn base_delay_ms() -> u64 {
        200
    }

    pub const fn max_delay_ms() -> u64 {
        5_000
    }

    pub const fn jitter_factor() -> f64 {
        0.1
    }
}
