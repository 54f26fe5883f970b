//! Round-trip aggregation: folds a fill stream into per-symbol
//! entry/exit legs and emits a completed-trip record whenever a symbol
//! returns to flat. Pure and deterministic — no IO, no time, no randomness;
//! callers own persistence (typically via `fbt-audit`).

mod round_trip;
mod types;

pub use round_trip::{RoundTripAggregator, RoundTripError};
pub use types::{Direction, Fill, RoundTrip};
