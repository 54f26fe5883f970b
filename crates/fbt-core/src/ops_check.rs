//! Ops-check row: a per-symbol operability snapshot exported by the
//! Runner's `--ops-check` CLI path and by the Daemon's `/status` route.
//!
//! A typed struct over `i64` micros rather than a loosely-typed map.
//! `decision`/`predicted_apr`/`reason` stay as plain strings/options here
//! (not `fbt_strategy::Decision`) so this crate doesn't depend on the strategy
//! crate; callers format the decision before constructing a row.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpsCheckRow {
    pub symbol: String,
    pub funding_predicted: Option<i64>,
    pub next_funding_time: Option<i64>,
    pub bbo_bid: Option<i64>,
    pub bbo_ask: Option<i64>,
    pub bbo_valid: bool,
    pub price_scale_ready: bool,
    /// "READY" | "FROZEN" | "NO_ANCHOR" | "UNKNOWN"
    pub price_state: String,
    pub md_ready: bool,
    pub md_reason: String,
    pub cooldown_active: bool,
    pub cooldown_left_ms: i64,
    pub qty_step_spot: i64,
    pub qty_step_perp: i64,
    pub qty_common_step: i64,
    pub min_qty_spot: i64,
    pub min_qty_perp: i64,
    pub min_notional_spot: i64,
    pub min_notional_perp: i64,
    pub auth: bool,
    pub open_orders: usize,
    pub decision: String,
    pub predicted_apr: Option<i64>,
    pub reason: String,
}

/// `bid`/`ask` are "normal" when both are positive and `bid < ask`.
pub fn bbo_valid(bid: Option<i64>, ask: Option<i64>) -> bool {
    match (bid, ask) {
        (Some(b), Some(a)) => b > 0 && a > 0 && b < a,
        _ => false,
    }
}
