//! Per-upstream token-bucket admission
//!
//! One bucket per upstream tag, configured as `points` permits refilled
//! linearly over a duration. `acquire` never blocks: when the bucket is
//! empty it reports how long until the next permit and the caller decides
//! whether to wait.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokenpulse_core::{AggregatorError, RateLimitConfig, SourceId};

#[derive(Clone)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    /// Permits per second
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.points as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / config.duration_secs.max(1) as f64,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = f64::min(self.capacity, self.tokens + elapsed * self.refill_rate);
        self.last_update = now;
    }

    /// Consume one permit, or report the wait until the next one
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_rate))
        }
    }
}

/// Token-bucket rate limiter keyed by upstream tag
pub struct RateLimiter {
    buckets: DashMap<SourceId, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Register a bucket for an upstream; replaces any existing bucket
    pub fn register(&self, source: SourceId, config: &RateLimitConfig) {
        self.buckets.insert(source, Bucket::new(config));
    }

    /// Consume one permit for the given upstream
    ///
    /// Fails with `RateLimited { retry_after }` when the bucket is empty
    /// and `Config` when no bucket was registered for the tag.
    pub fn acquire(&self, source: SourceId) -> Result<(), AggregatorError> {
        let mut bucket = self.buckets.get_mut(&source).ok_or_else(|| {
            AggregatorError::Config(format!("no rate-limit bucket registered for {source}"))
        })?;

        bucket
            .try_acquire(Instant::now())
            .map_err(|retry_after| AggregatorError::RateLimited { retry_after })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
