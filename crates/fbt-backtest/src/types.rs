use std::collections::BTreeMap;

use fbt_portfolio::RoundTrip;

/// One replayed top-of-book/last-trade observation for a symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tick {
    pub ts_ms: i64,
    pub symbol: String,
    pub bid_micros: i64,
    pub ask_micros: i64,
    pub last_micros: i64,
}

impl Tick {
    pub fn new(ts_ms: i64, symbol: impl Into<String>, bid_micros: i64, ask_micros: i64, last_micros: i64) -> Self {
        Self { ts_ms, symbol: symbol.into(), bid_micros, ask_micros, last_micros }
    }
}

/// One funding settlement applied to whatever position is open at `ts_ms`:
/// a long position pays `rate_e6 · |qty| · last_px`, a short receives it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundingEvent {
    pub ts_ms: i64,
    pub symbol: String,
    pub rate_e6: i64,
}

impl FundingEvent {
    pub fn new(ts_ms: i64, symbol: impl Into<String>, rate_e6: i64) -> Self {
        Self { ts_ms, symbol: symbol.into(), rate_e6 }
    }
}

/// Backtest replayer tunables.
///
/// A `test_defaults`/`conservative_defaults` split: the test profile drives
/// strategy decisions every tick (`step_sec = 0`) so scenario tests don't
/// need to fabricate a long tick history, while the conservative profile
/// evaluates on a realistic cadence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BacktestConfig {
    /// Minimum simulated seconds between strategy evaluations. `0` means
    /// "evaluate on every tick".
    pub step_sec: i64,
    /// Flatten every open position via the strategy's `Close` path once
    /// replay exhausts its ticks.
    pub flatten_at_end: bool,
}

impl BacktestConfig {
    /// Permissive profile for unit tests: evaluates every tick, flattens at
    /// the end so scenario assertions see a closed book.
    pub fn test_defaults() -> Self {
        Self { step_sec: 0, flatten_at_end: true }
    }

    /// Conservative profile for real evaluation runs: strategy cadence
    /// matches the live Runner's ~3s strategy loop period.
    pub fn conservative_defaults() -> Self {
        Self { step_sec: 3, flatten_at_end: true }
    }
}

/// Result of a full backtest replay.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BacktestReport {
    pub funding_pnl_micros: i64,
    pub trading_pnl_micros: i64,
    pub fees_micros: i64,
    pub net_pnl_micros: i64,
    pub round_trips: Vec<RoundTrip>,
    pub funding_events_applied: usize,
    pub last_prices: BTreeMap<String, i64>,
}
