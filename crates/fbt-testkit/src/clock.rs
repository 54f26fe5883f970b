//! Deterministic clock doubles for scenario tests.
//!
//! `fbt_core::clock::scripted_clock` already covers the "replay a fixed
//! sequence" case; this module adds a settable variant for tests that need
//! to advance time explicitly between steps (mirrors the ad hoc
//! `AtomicI64`-backed clock each component's own unit tests build by hand).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use fbt_core::MonoClock;

pub use fbt_core::clock::scripted_clock;

/// A handle that lets a test advance the clock a [`ManualClock`] reads.
#[derive(Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn set(&self, ms: i64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn now(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Returns a [`MonoClock`] closure paired with a [`ManualClock`] handle that
/// controls what it reads, starting at `start_ms`.
pub fn manual_clock(start_ms: i64) -> (MonoClock, ManualClock) {
    let now_ms = Arc::new(AtomicI64::new(start_ms));
    let handle = ManualClock { now_ms: now_ms.clone() };
    let clock: MonoClock = Arc::new(move || now_ms.load(Ordering::SeqCst));
    (clock, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_reads_back_what_was_set() {
        let (clock, handle) = manual_clock(1_000);
        assert_eq!(clock(), 1_000);
        handle.set(5_000);
        assert_eq!(clock(), 5_000);
    }

    #[test]
    fn manual_clock_advance_accumulates() {
        let (clock, handle) = manual_clock(0);
        handle.advance(100);
        handle.advance(50);
        assert_eq!(clock(), 150);
        assert_eq!(handle.now(), 150);
    }
}
