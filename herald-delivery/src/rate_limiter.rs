//! Per-channel send throttling
//!
//! Each channel owns a token bucket refilled at `messages_per_second` and
//! holding at most `burst_size` tokens. A worker that finds the bucket empty
//! does not poll it: it reserves the next token up front, which puts the
//! bucket into debt, and sleeps until that token has been earned. Concurrent
//! waiters therefore queue up at evenly spaced deadlines instead of racing
//! for the same refill. A waiter that is cancelled hands its reservation
//! back.

use std::sync::Arc;

use dashmap::DashMap;
use herald_common::{Channel, tracing::trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::cancel::{CancelSignal, Cancelled};

/// Throughput limits applied to every channel without an override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained sends per second
    ///
    /// Default: 10
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Sends allowed back to back after an idle period
    ///
    /// Default: 20
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    #[serde(default)]
    pub channel_limits: ahash::AHashMap<Channel, ChannelRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            channel_limits: ahash::AHashMap::default(),
        }
    }
}

impl RateLimitConfig {
    fn limit_for(&self, channel: Channel) -> ChannelRateLimit {
        self.channel_limits
            .get(&channel)
            .cloned()
            .unwrap_or(ChannelRateLimit {
                messages_per_second: self.messages_per_second,
                burst_size: self.burst_size,
            })
    }
}

const fn default_messages_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

/// Provider limit for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRateLimit {
    pub messages_per_second: f64,
    pub burst_size: u32,
}

#[derive(Debug)]
struct Bucket {
    /// Negative while reservations are outstanding
    tokens: f64,
    capacity: f64,
    per_second: f64,
    updated: Instant,
}

impl Bucket {
    fn new(limit: &ChannelRateLimit, now: Instant) -> Self {
        let capacity = f64::from(limit.burst_size.max(1));
        let per_second = if limit.messages_per_second.is_nan() {
            0.0
        } else {
            limit.messages_per_second.clamp(0.0, f64::MAX)
        };

        Self {
            tokens: capacity,
            capacity,
            per_second,
            updated: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let earned = now.saturating_duration_since(self.updated).as_secs_f64() * self.per_second;
        self.tokens = (self.tokens + earned).min(self.capacity);
        self.updated = now;
    }

    /// Take the next token and return when it may be used
    ///
    /// `None` if the bucket is empty and never refills; nothing is taken then.
    fn reserve(&mut self, now: Instant) -> Option<Instant> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Some(now);
        }
        if self.per_second <= 0.0 {
            return None;
        }

        self.tokens -= 1.0;
        let debt = -self.tokens;
        Duration::try_from_secs_f64(debt / self.per_second)
            .ok()
            .and_then(|wait| now.checked_add(wait))
    }

    fn release(&mut self) {
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }
}

/// Token buckets for every channel, created on first use
///
/// One limiter is shared by all workers of a run, or by every run when the
/// engine is configured with a single gateway budget.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<Channel, Arc<Mutex<Bucket>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn bucket(&self, channel: Channel) -> Arc<Mutex<Bucket>> {
        let bucket = self.buckets.entry(channel).or_insert_with(|| {
            Arc::new(Mutex::new(Bucket::new(
                &self.config.limit_for(channel),
                Instant::now(),
            )))
        });
        Arc::clone(bucket.value())
    }

    /// Wait for a send slot on `channel`
    ///
    /// # Errors
    /// If `cancel` is raised before the slot comes up. The reservation is
    /// returned to the bucket.
    pub async fn acquire(&self, channel: Channel, cancel: &CancelSignal) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let bucket = self.bucket(channel);
        let now = Instant::now();
        let reserved = bucket.lock().reserve(now);

        let Some(ready_at) = reserved else {
            trace!(%channel, "Channel has no send budget, waiting for cancellation");
            cancel.cancelled().await;
            return Err(Cancelled);
        };
        if ready_at <= now {
            return Ok(());
        }

        trace!(
            %channel,
            wait_ms = (ready_at - now).as_millis(),
            "Throttled, waiting for send slot"
        );

        tokio::select! {
            () = tokio::time::sleep_until(ready_at) => Ok(()),
            () = cancel.cancelled() => {
                bucket.lock().release();
                Err(Cancelled)
            }
        }
    }
}
