//! REST circuit breaker + concurrency cap (REST discipline).
//!
//! Every outward REST call passes through [`RestGuard::call`]: checks the
//! breaker, acquires a semaphore permit, resets the failure counter on
//! success, and opens the breaker after `cb_fail_threshold` consecutive
//! failures.

use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use fbt_core::{FbtError, FbtResult};
use tokio::sync::Semaphore;

pub struct RestGuard {
    semaphore: Semaphore,
    failures: AtomicU32,
    open_until_ms: AtomicI64,
    cb_fail_threshold: u32,
    cb_open_ms: i64,
}

impl RestGuard {
    pub fn new(rest_max_concurrency: usize, cb_fail_threshold: u32, cb_open_seconds: i64) -> Self {
        Self {
            semaphore: Semaphore::new(rest_max_concurrency),
            failures: AtomicU32::new(0),
            open_until_ms: AtomicI64::new(0),
            cb_fail_threshold,
            cb_open_ms: cb_open_seconds * 1_000,
        }
    }

    pub async fn call<F, Fut, T>(&self, now_ms: i64, f: F) -> FbtResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FbtResult<T>>,
    {
        let open_until = self.open_until_ms.load(Ordering::SeqCst);
        if now_ms < open_until {
            return Err(FbtError::RateLimited("REST circuit open (cooling down)".to_string()));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        match f().await {
            Ok(v) => {
                self.failures.store(0, Ordering::SeqCst);
                Ok(v)
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.cb_fail_threshold {
                    self.open_until_ms.store(now_ms + self.cb_open_ms, Ordering::SeqCst);
                    self.failures.store(0, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }
}
