//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::{policy::RetryPolicy, rate_limiter::RateLimitConfig, recorder::RecorderConfig};

/// Upper bound on workers per run, whatever the configuration says
pub const MAX_CONCURRENCY: usize = 64;

const fn default_concurrency() -> usize {
    5
}

const fn default_progress_every() -> u64 {
    5
}

const fn default_event_buffer() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent workers per campaign run, clamped to `1..=MAX_CONCURRENCY`
    ///
    /// Default: 5
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry of transient send failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-channel send rate
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Share one per-channel budget between all runs instead of giving each
    /// run its own buckets
    ///
    /// Default: `false`
    #[serde(default)]
    pub shared_rate_limit: bool,

    /// Publish a progress event every this many resolved recipients
    /// (0 disables intermediate events)
    ///
    /// Default: 5
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Capacity of each campaign's event channel; slow subscribers beyond
    /// this lag and skip events
    ///
    /// Default: 256
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Bounded retry for outcome and campaign writes
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Abort a run as a gateway outage after this many consecutive
    /// recipients exhausted their transient retries
    ///
    /// Default: `None` (never)
    #[serde(default)]
    pub abort_after_consecutive_failures: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            shared_rate_limit: false,
            progress_every: default_progress_every(),
            event_buffer: default_event_buffer(),
            recorder: RecorderConfig::default(),
            abort_after_consecutive_failures: None,
        }
    }
}

impl EngineConfig {
    /// Effective worker count
    #[must_use]
    pub fn workers(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_common::Channel;

    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.workers(), 5);
        assert_eq!(config.progress_every, 5);
        assert_eq!(config.retry.max_retries, 2);
        assert!(!config.shared_rate_limit);
        assert!(config.abort_after_consecutive_failures.is_none());
    }

    #[test]
    fn workers_are_clamped() {
        let mut config = EngineConfig {
            concurrency: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.workers(), 1);

        config.concurrency = 10_000;
        assert_eq!(config.workers(), MAX_CONCURRENCY);
    }

    #[test]
    fn deserialize_ron() {
        let config: EngineConfig = ron::from_str(
            r"(
                concurrency: 8,
                progress_every: 10,
                retry: (max_retries: 3, base_delay_ms: 100),
                rate_limit: (
                    channel_limits: {
                        whatsapp: (messages_per_second: 1.0, burst_size: 5),
                    },
                ),
                abort_after_consecutive_failures: Some(20),
            )",
        )
        .unwrap();

        assert_eq!(config.workers(), 8);
        assert_eq!(config.progress_every, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.max_delay_ms, 5_000);
        assert_eq!(config.rate_limit.burst_size, 20);
        assert_eq!(
            config.rate_limit.channel_limits[&Channel::WhatsApp].burst_size,
            5
        );
        assert_eq!(config.abort_after_consecutive_failures, Some(20));
        assert_eq!(config.recorder, RecorderConfig::default());
    }
}
