//! Tokenpulse Data
//!
//! The aggregation pipeline: upstream adapters, rate limiting, retry,
//! merging, the TTL snapshot store, the scheduler, and change detection.

pub mod change_detector;
pub mod merger;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;
pub mod snapshot_store;
pub mod upstream;

pub use change_detector::{AlertThresholds, ChangeDetector};
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
pub use scheduler::{ScheduledSource, Scheduler};
pub use snapshot_store::{MemorySnapshotStore, RedisSnapshotStore};
pub use upstream::{CoingeckoClient, DexscreenerClient};
