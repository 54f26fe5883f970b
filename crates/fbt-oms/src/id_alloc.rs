//! Deterministic `client_order_id` derivation and the inflight-id set.
//!
//! IDs are never random: the same logical intent (symbol + side + a caller
//! supplied nonce) always derives the same id, so a retried submit reuses
//! the id instead of risking a duplicate live order.

use std::collections::HashSet;

/// Derive a venue-safe, deterministic client order id.
///
/// `nonce` is caller-controlled (e.g. a monotonic strategy-loop counter or
/// the backtest tick index) — passing the same `(symbol, side, nonce)` always
/// yields the same id.
pub fn derive_client_order_id(symbol: &str, side: &str, nonce: u64) -> String {
    format!("fbt-{symbol}-{side}-{nonce:016x}")
}

/// Derive the id for a partial-fill timeout/resend child order.
pub fn derive_child_id(parent_id: &str, retry: u32) -> String {
    format!("{parent_id}-r{retry}")
}

/// Tracks ids currently live at the venue. Submission of a duplicate id
/// while it is inflight is a `RiskBreach`, not a silent no-op.
#[derive(Debug, Default)]
pub struct InflightSet {
    ids: HashSet<String>,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    pub fn remove(&mut self, id: &str) {
        self.ids.remove(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_derive_same_id() {
        let a = derive_client_order_id("BTCUSDT", "buy", 7);
        let b = derive_client_order_id("BTCUSDT", "buy", 7);
        assert_eq!(a, b);
    }

    #[test]
    fn different_nonce_derives_different_id() {
        let a = derive_client_order_id("BTCUSDT", "buy", 7);
        let b = derive_client_order_id("BTCUSDT", "buy", 8);
        assert_ne!(a, b);
    }

    #[test]
    fn child_id_encodes_parent_and_retry() {
        let child = derive_child_id("fbt-x", 2);
        assert_eq!(child, "fbt-x-r2");
    }

    #[test]
    fn inflight_set_tracks_membership() {
        let mut set = InflightSet::new();
        assert!(!set.contains("a"));
        set.insert("a");
        assert!(set.contains("a"));
        set.remove("a");
        assert!(!set.contains("a"));
    }
}
