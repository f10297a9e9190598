//! Per-call timeouts and bounded exponential-backoff retries for adapter calls.

use crate::config::RetryConfig;
use crate::error::{TierError, TierKind, TierResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bound a single adapter call. An elapsed call becomes a retryable
/// [`TierError::Transient`], distinct from a definitive not-found.
pub async fn with_timeout<T, F>(
    tier: TierKind,
    op: &'static str,
    limit: Duration,
    fut: F,
) -> TierResult<T>
where
    F: Future<Output = TierResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TierError::transient(
            tier,
            op,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, op: &'static str, record_id: &str, mut call: F) -> TierResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TierResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        record_id,
                        op,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
