//! Clock discipline.
//!
//! Two distinct notions of time flow through the system: a *monotonic*
//! millisecond counter used for timeouts, cooldowns and throttle windows, and
//! a *wall clock* used only for audit timestamps and funding settlement
//! comparisons. Mixing the two is the classic source of flaky tests and
//! clock-skew bugs, so the monotonic side is always injected as a plain
//! closure rather than read from `Instant::now()` directly — tests drive it
//! with a scripted sequence, production wires it to the real clock.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of monotonic milliseconds. Must never go backwards.
pub type MonoClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Real monotonic clock: wall-clock milliseconds since the Unix epoch.
///
/// This is "monotonic" in the sense the rest of the system cares about
/// (never goes backwards under normal NTP-disciplined operation), not the
/// `std::time::Instant` sense of immune-to-clock-adjustment. Audit
/// timestamps and cooldown math both want epoch milliseconds, so a single
/// clock source serves both.
pub fn system_clock() -> MonoClock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    })
}

/// Current UTC wall-clock time, for audit records and funding-time math.
pub fn now_utc() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

/// A clock that replays a fixed sequence of timestamps, holding on the last
/// value once exhausted. Used by deterministic unit tests.
pub fn scripted_clock(mut ticks: Vec<i64>) -> MonoClock {
    use std::sync::Mutex;
    let ticks = Mutex::new(ticks.drain(..).collect::<std::collections::VecDeque<_>>());
    let last = Mutex::new(0i64);
    Arc::new(move || {
        let mut q = ticks.lock().unwrap();
        let mut last = last.lock().unwrap();
        if let Some(t) = q.pop_front() {
            *last = t;
            t
        } else {
            *last
        }
    })
}
