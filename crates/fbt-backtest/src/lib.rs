//! fbt-backtest
//!
//! Backtest Replayer — event-sourced replay.
//!
//! Pipeline: TICK -> STRATEGY -> PAPER EXCHANGE -> OMS -> PORTFOLIO
//!
//! - Deterministic replay (same ticks + funding schedule + config => identical results)
//! - No lookahead: the strategy only ever sees the BBO/last-trade state as of
//!   the tick currently being replayed
//! - Funding settlement applied against whatever position is open at the
//!   funding event's timestamp, read straight off the round-trip aggregator
//! - Reuses the Paper Exchange and OMS unmodified so a
//!   backtest and a paper run share the exact same execution semantics

mod engine;
pub mod types;

pub use engine::{BacktestEngine, BacktestError};
pub use types::{BacktestConfig, BacktestReport, FundingEvent, Tick};
