//! Per-symbol round-trip aggregation: folds a fill stream into
//! weighted-average entry/exit legs and emits a [`RoundTrip`] record each
//! time a symbol returns to flat.
//!
//! Pure and IO-free, mirroring the ledger's "no IO, no time, no randomness"
//! discipline — callers own persistence (typically via `fbt-audit`).

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Direction, Fill, RoundTrip};

const EPSILON_QTY: i64 = 0;

#[derive(Debug, Clone, Default)]
struct RoundState {
    open_sign: i64,
    open_qty: i64,
    entry_ts_ms: i64,
    entry_avg_px_micros: i64,
    fees_open_micros: i64,
    entry_client_order_ids: BTreeSet<String>,

    closed_qty: i64,
    entry_value_closed: i128,
    exit_value_closed: i128,
    fees_close_micros: i64,
    exit_ts_ms: i64,
    exit_client_order_ids: BTreeSet<String>,
}

impl RoundState {
    fn is_flat(&self) -> bool {
        self.open_sign == 0
    }
}

/// Error returned when a [`Fill`] is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundTripError {
    NonPositiveQty { qty: i64 },
    NonPositivePrice { price_micros: i64 },
    NegativeFee { fee_micros: i64 },
    EmptySymbol,
}

impl std::fmt::Display for RoundTripError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty { qty } => write!(f, "round-trip invariant: qty must be > 0, got {qty}"),
            Self::NonPositivePrice { price_micros } => {
                write!(f, "round-trip invariant: price_micros must be > 0, got {price_micros}")
            }
            Self::NegativeFee { fee_micros } => {
                write!(f, "round-trip invariant: fee_micros must be >= 0, got {fee_micros}")
            }
            Self::EmptySymbol => write!(f, "round-trip invariant: symbol must not be empty"),
        }
    }
}

impl std::error::Error for RoundTripError {}

/// Accumulates fills per symbol, emitting a [`RoundTrip`] record whenever a
/// symbol's open leg returns to flat.
#[derive(Debug, Clone, Default)]
pub struct RoundTripAggregator {
    state: BTreeMap<String, RoundState>,
}

impl RoundTripAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fill. Returns `Some(RoundTrip)` if this fill closed the
    /// symbol's open leg exactly flat.
    pub fn on_fill(&mut self, fill: &Fill) -> Result<Option<RoundTrip>, RoundTripError> {
        Self::validate(fill)?;

        let signed = fill.signed_qty();
        let mut s = self.state.remove(&fill.symbol).unwrap_or_default();

        if s.is_flat() {
            Self::open_leg(&mut s, signed, fill);
            self.state.insert(fill.symbol.clone(), s);
            return Ok(None);
        }

        let same_direction = (signed > 0 && s.open_sign > 0) || (signed < 0 && s.open_sign < 0);
        if same_direction {
            let add_qty = signed.unsigned_abs() as i64;
            let new_open_qty = s.open_qty + add_qty;
            s.entry_avg_px_micros = weighted_avg(
                s.entry_avg_px_micros,
                s.open_qty,
                fill.price_micros,
                add_qty,
            );
            s.open_qty = new_open_qty;
            s.fees_open_micros += fill.fee_micros.max(0);
            s.entry_client_order_ids.insert(fill.client_order_id.clone());
            self.state.insert(fill.symbol.clone(), s);
            return Ok(None);
        }

        // Opposite direction: close some or all of the open leg.
        let close_qty = signed.unsigned_abs().min(s.open_qty as u64) as i64;
        if close_qty > 0 {
            s.closed_qty += close_qty;
            s.entry_value_closed += s.entry_avg_px_micros as i128 * close_qty as i128;
            s.exit_value_closed += fill.price_micros as i128 * close_qty as i128;
            s.fees_close_micros += fill.fee_micros.max(0);
            s.exit_ts_ms = fill.ts_ms;
            s.exit_client_order_ids.insert(fill.client_order_id.clone());
            s.open_qty -= close_qty;
        }

        let mut emitted = None;
        if s.open_qty <= EPSILON_QTY {
            emitted = Some(Self::finish_round(&fill.symbol, &s));
        } else {
            self.state.insert(fill.symbol.clone(), s.clone());
        }

        let remainder = signed.unsigned_abs() as i64 - close_qty;
        if remainder > 0 {
            let mut fresh = RoundState::default();
            Self::open_leg(&mut fresh, if signed > 0 { remainder } else { -remainder }, fill);
            // The closing leg's fee was already counted above; the flipped
            // remainder opens with zero entry fee.
            fresh.fees_open_micros = 0;
            self.state.insert(fill.symbol.clone(), fresh);
        } else if emitted.is_some() {
            self.state.remove(&fill.symbol);
        }

        Ok(emitted)
    }

    fn open_leg(s: &mut RoundState, signed: i64, fill: &Fill) {
        s.open_sign = signed.signum();
        s.open_qty = signed.unsigned_abs() as i64;
        s.entry_ts_ms = fill.ts_ms;
        s.entry_avg_px_micros = fill.price_micros;
        s.fees_open_micros = fill.fee_micros.max(0);
        s.entry_client_order_ids.clear();
        s.entry_client_order_ids.insert(fill.client_order_id.clone());
        s.closed_qty = 0;
        s.entry_value_closed = 0;
        s.exit_value_closed = 0;
        s.fees_close_micros = 0;
        s.exit_ts_ms = 0;
        s.exit_client_order_ids.clear();
    }

    fn finish_round(symbol: &str, s: &RoundState) -> RoundTrip {
        let qty = s.closed_qty;
        let entry_avg_px_micros = if qty > 0 { (s.entry_value_closed / qty as i128) as i64 } else { 0 };
        let exit_avg_px_micros = if qty > 0 { (s.exit_value_closed / qty as i128) as i64 } else { 0 };
        let sign = s.open_sign;
        let gross_pnl_micros = (sign as i128 * (s.exit_value_closed - s.entry_value_closed)) as i64;
        let net_pnl_micros = gross_pnl_micros - s.fees_open_micros - s.fees_close_micros;
        let hold_secs = ((s.exit_ts_ms - s.entry_ts_ms).max(0)) / 1_000;

        RoundTrip {
            symbol: symbol.to_string(),
            direction: Direction::of_sign(sign),
            qty,
            entry_ts_ms: s.entry_ts_ms,
            exit_ts_ms: s.exit_ts_ms,
            hold_secs,
            entry_avg_px_micros,
            exit_avg_px_micros,
            gross_pnl_micros,
            fees_open_micros: s.fees_open_micros,
            fees_close_micros: s.fees_close_micros,
            net_pnl_micros,
            entry_client_order_ids: s.entry_client_order_ids.iter().cloned().collect(),
            exit_client_order_ids: s.exit_client_order_ids.iter().cloned().collect(),
        }
    }

    /// `true` if the given symbol currently has no open leg.
    pub fn is_flat(&self, symbol: &str) -> bool {
        self.state.get(symbol).map(RoundState::is_flat).unwrap_or(true)
    }

    /// Signed quantity of the symbol's currently open leg (0 if flat).
    pub fn open_position_signed_qty(&self, symbol: &str) -> i64 {
        self.state
            .get(symbol)
            .map(|s| s.open_sign * s.open_qty)
            .unwrap_or(0)
    }

    /// Weighted-average entry price of the symbol's currently open leg (0 if flat).
    pub fn open_avg_px_micros(&self, symbol: &str) -> i64 {
        self.state.get(symbol).map(|s| s.entry_avg_px_micros).unwrap_or(0)
    }

    fn validate(fill: &Fill) -> Result<(), RoundTripError> {
        if fill.symbol.trim().is_empty() {
            return Err(RoundTripError::EmptySymbol);
        }
        if fill.qty <= 0 {
            return Err(RoundTripError::NonPositiveQty { qty: fill.qty });
        }
        if fill.price_micros <= 0 {
            return Err(RoundTripError::NonPositivePrice { price_micros: fill.price_micros });
        }
        if fill.fee_micros < 0 {
            return Err(RoundTripError::NegativeFee { fee_micros: fill.fee_micros });
        }
        Ok(())
    }
}

fn weighted_avg(avg_a: i64, qty_a: i64, px_b: i64, qty_b: i64) -> i64 {
    let total = qty_a + qty_b;
    if total == 0 {
        return avg_a;
    }
    ((avg_a as i128 * qty_a as i128 + px_b as i128 * qty_b as i128) / total as i128) as i64
}
