//! Exponential-jitter retry wrapper.
//!
//! Decorates an async operation with bounded retry attempts, backing off
//! exponentially between attempts with full jitter. Only [`FbtError`] kinds
//! marked [`FbtError::is_retryable`] trigger a retry; every other error
//! propagates on the first attempt.

use crate::error::FbtError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    pub fn sane_defaults() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.max_backoff_ms);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }
}

/// Runs `op` up to `cfg.max_attempts` times, retrying only on a retryable
/// [`FbtError`] and sleeping an exponential-jitter backoff between attempts.
pub async fn retry<F, Fut, T>(cfg: &RetryConfig, mut op: F) -> Result<T, FbtError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FbtError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < cfg.max_attempts => {
                let wait = cfg.backoff_for_attempt(attempt);
                tracing::warn!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
