//! Exponential backoff with jitter around any fallible call
//!
//! Delay before attempt k (1-indexed, k >= 2) is
//! `base_delay * 2^(k-2) + U[0, 1s)`. The last error is returned verbatim
//! when all attempts fail; terminal errors are never retried.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_JITTER_MS: u64 = 1000;

/// Backoff parameters for one retried operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Backoff before the given attempt (2-indexed), without jitter
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(2))
    }
}

/// Run `op` under the policy, retrying transient failures
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, tokenpulse_core::AggregatorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, tokenpulse_core::AggregatorError>>,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt >= policy.max_attempts {
                    warn!(attempts = attempt, error = %e, "retries exhausted");
                    return Err(e);
                }

                attempt += 1;
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS));
                let delay = policy.backoff(attempt) + jitter;
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "backing off");
                sleep(delay).await;
            }
        }
    }
}
