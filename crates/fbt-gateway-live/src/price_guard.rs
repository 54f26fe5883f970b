//! Per-symbol price-scale readiness and perp/spot anchor guard.
//!
//! A raw perp price is only trusted once two things hold: the instrument's
//! price scale has stabilised (`is_price_scale_ready`), and a fresh spot-mid
//! anchor exists to sanity-check the observation against (`guard`). Until
//! both hold, or once an observation stops being plausible, the state stays
//! `NoAnchor`/`Frozen` and callers should treat the symbol as not tradeable.

use std::collections::HashMap;
use std::sync::Mutex;

const ANCHOR_MAX_AGE_MS: i64 = 5_000;
const FREEZE_STALE_MAX_MS: i64 = 120_000;
const PERP_SPOT_RATIO_LOW: f64 = 0.7;
const PERP_SPOT_RATIO_HIGH: f64 = 1.3;
const LAST_GOOD_BAND: f64 = 0.3;
const SCALE_PROBE_COOLDOWN_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceGuardState {
    NoAnchor,
    Ready,
    Frozen,
}

impl PriceGuardState {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceGuardState::NoAnchor => "NO_ANCHOR",
            PriceGuardState::Ready => "READY",
            PriceGuardState::Frozen => "FROZEN",
        }
    }
}

#[derive(Default)]
struct SymbolGuard {
    state: Option<PriceGuardState>,
    anchor_px: Option<i64>,
    anchor_ts_ms: Option<i64>,
    last_good_perp: Option<i64>,
    frozen_since_ms: Option<i64>,
    scale_ready_count: u32,
    scale_wait_start_ms: Option<i64>,
    last_scale_seen: Option<u32>,
    last_scale_probe_ms: Option<i64>,
}

/// Per-symbol anchor/scale state, one instance shared by a `LiveGateway`.
pub struct PriceGuard {
    symbols: Mutex<HashMap<String, SymbolGuard>>,
}

impl PriceGuard {
    pub fn new() -> Self {
        Self { symbols: Mutex::new(HashMap::new()) }
    }

    /// Feed a spot-mid observation as the anchor for `perp_symbol`.
    pub fn update_anchor(&self, perp_symbol: &str, anchor_px: i64, now_ms: i64) {
        let mut map = self.symbols.lock().unwrap();
        let g = map.entry(perp_symbol.to_string()).or_default();
        g.anchor_px = Some(anchor_px);
        g.anchor_ts_ms = Some(now_ms);
    }

    /// Record one more observation of `symbol`'s instrument price scale;
    /// feeds the consecutive-observation counter `is_price_scale_ready` reads.
    pub fn observe_scale(&self, symbol: &str, scale: u32, now_ms: i64) {
        let mut map = self.symbols.lock().unwrap();
        let g = map.entry(symbol.to_string()).or_default();
        if g.scale_wait_start_ms.is_none() {
            g.scale_wait_start_ms = Some(now_ms);
        }
        if g.last_scale_seen == Some(scale) {
            g.scale_ready_count = g.scale_ready_count.saturating_add(1);
        } else {
            g.last_scale_seen = Some(scale);
            g.scale_ready_count = 1;
        }
    }

    /// Ready once `required` consecutive observations agreed, or once
    /// `max_wait_ms` has elapsed since the first observation (so a quiet
    /// instrument doesn't block forever).
    pub fn is_price_scale_ready(&self, symbol: &str, required: u32, max_wait_ms: i64, now_ms: i64) -> bool {
        let map = self.symbols.lock().unwrap();
        let Some(g) = map.get(symbol) else { return false };
        if g.scale_ready_count >= required {
            return true;
        }
        g.scale_wait_start_ms.map(|start| now_ms - start >= max_wait_ms).unwrap_or(false)
    }

    /// Whether `symbol` is due for a rate-limited metadata re-probe (at most
    /// one per [`SCALE_PROBE_COOLDOWN_MS`]). Marks the probe taken
    /// regardless of whether the caller's fetch then succeeds.
    pub fn try_prime_scale(&self, symbol: &str, now_ms: i64) -> bool {
        let mut map = self.symbols.lock().unwrap();
        let g = map.entry(symbol.to_string()).or_default();
        match g.last_scale_probe_ms {
            Some(last) if now_ms - last < SCALE_PROBE_COOLDOWN_MS => false,
            _ => {
                g.last_scale_probe_ms = Some(now_ms);
                true
            }
        }
    }

    /// Current guard state for `symbol`; `NoAnchor` if never observed.
    pub fn state(&self, symbol: &str) -> PriceGuardState {
        let map = self.symbols.lock().unwrap();
        map.get(symbol).and_then(|g| g.state).unwrap_or(PriceGuardState::NoAnchor)
    }

    /// Run one raw perp price through the guard, returning the price callers
    /// should actually use: the observation itself once plausible, the last
    /// good perp price while frozen or unanchored, the raw observation if
    /// neither scale nor a last-good price exist yet.
    pub fn guard(&self, symbol: &str, raw_perp: i64, scale_ready: bool, now_ms: i64) -> i64 {
        let mut map = self.symbols.lock().unwrap();
        let g = map.entry(symbol.to_string()).or_default();

        if !scale_ready {
            g.state = Some(PriceGuardState::NoAnchor);
            return g.last_good_perp.unwrap_or(raw_perp);
        }

        let anchor_fresh = g.anchor_ts_ms.map(|ts| now_ms - ts <= ANCHOR_MAX_AGE_MS).unwrap_or(false);
        if !anchor_fresh {
            g.state = Some(PriceGuardState::NoAnchor);
            return g.last_good_perp.unwrap_or(raw_perp);
        }

        if is_plausible(g.anchor_px, raw_perp, g.last_good_perp) {
            g.state = Some(PriceGuardState::Ready);
            g.frozen_since_ms = None;
            g.last_good_perp = Some(raw_perp);
            return raw_perp;
        }

        let frozen_since = *g.frozen_since_ms.get_or_insert(now_ms);
        if now_ms - frozen_since > FREEZE_STALE_MAX_MS {
            g.state = Some(PriceGuardState::NoAnchor);
            g.frozen_since_ms = None;
        } else {
            g.state = Some(PriceGuardState::Frozen);
        }
        g.last_good_perp.unwrap_or(raw_perp)
    }
}

impl Default for PriceGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Plausible if within `PERP_SPOT_RATIO_LOW..HIGH` of the spot anchor, or
/// failing that, within `±LAST_GOOD_BAND` of the last good perp price.
fn is_plausible(anchor_px: Option<i64>, candidate: i64, last_good: Option<i64>) -> bool {
    if let Some(anchor) = anchor_px {
        if anchor > 0 {
            let ratio = candidate as f64 / anchor as f64;
            if ratio >= PERP_SPOT_RATIO_LOW && ratio <= PERP_SPOT_RATIO_HIGH {
                return true;
            }
        }
    }
    if let Some(good) = last_good {
        if good > 0 {
            let lower = (good as f64 * (1.0 - LAST_GOOD_BAND)) as i64;
            let upper = (good as f64 * (1.0 + LAST_GOOD_BAND)) as i64;
            return candidate >= lower && candidate <= upper;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_not_ready_forces_no_anchor() {
        let g = PriceGuard::new();
        assert_eq!(g.guard("BTCUSDT", 100, false, 0), 100);
        assert_eq!(g.state("BTCUSDT"), PriceGuardState::NoAnchor);
    }

    #[test]
    fn stale_anchor_forces_no_anchor() {
        let g = PriceGuard::new();
        g.update_anchor("BTCUSDT", 100_000_000, 0);
        g.guard("BTCUSDT", 100_000_000, true, 10_000);
        assert_eq!(g.state("BTCUSDT"), PriceGuardState::NoAnchor);
    }

    #[test]
    fn plausible_observation_goes_ready() {
        let g = PriceGuard::new();
        g.update_anchor("BTCUSDT", 100_000_000, 0);
        let guarded = g.guard("BTCUSDT", 101_000_000, true, 1_000);
        assert_eq!(guarded, 101_000_000);
        assert_eq!(g.state("BTCUSDT"), PriceGuardState::Ready);
    }

    #[test]
    fn implausible_observation_freezes_and_holds_last_good() {
        let g = PriceGuard::new();
        g.update_anchor("BTCUSDT", 100_000_000, 0);
        g.guard("BTCUSDT", 100_500_000, true, 1_000);
        let guarded = g.guard("BTCUSDT", 500_000_000, true, 2_000);
        assert_eq!(guarded, 100_500_000);
        assert_eq!(g.state("BTCUSDT"), PriceGuardState::Frozen);
    }

    #[test]
    fn frozen_escalates_to_no_anchor_after_stale_timeout() {
        let g = PriceGuard::new();
        g.update_anchor("BTCUSDT", 100_000_000, 0);
        g.guard("BTCUSDT", 100_500_000, true, 1_000);
        g.guard("BTCUSDT", 500_000_000, true, 2_000);
        g.guard("BTCUSDT", 500_000_000, true, 2_000 + FREEZE_STALE_MAX_MS + 1);
        assert_eq!(g.state("BTCUSDT"), PriceGuardState::NoAnchor);
    }

    #[test]
    fn frozen_recovers_to_ready_on_plausible_observation() {
        let g = PriceGuard::new();
        g.update_anchor("BTCUSDT", 100_000_000, 0);
        g.guard("BTCUSDT", 100_500_000, true, 1_000);
        g.guard("BTCUSDT", 500_000_000, true, 2_000);
        g.update_anchor("BTCUSDT", 100_000_000, 3_000);
        let guarded = g.guard("BTCUSDT", 102_000_000, true, 3_000);
        assert_eq!(guarded, 102_000_000);
        assert_eq!(g.state("BTCUSDT"), PriceGuardState::Ready);
    }

    #[test]
    fn scale_readiness_requires_consecutive_agreement_or_wait() {
        let g = PriceGuard::new();
        assert!(!g.is_price_scale_ready("BTCUSDT", 2, 30_000, 0));
        g.observe_scale("BTCUSDT", 2, 0);
        assert!(!g.is_price_scale_ready("BTCUSDT", 2, 30_000, 0));
        g.observe_scale("BTCUSDT", 2, 100);
        assert!(g.is_price_scale_ready("BTCUSDT", 2, 30_000, 100));
    }

    #[test]
    fn scale_readiness_falls_back_to_max_wait() {
        let g = PriceGuard::new();
        g.observe_scale("BTCUSDT", 2, 0);
        assert!(g.is_price_scale_ready("BTCUSDT", 5, 30_000, 30_000));
    }

    #[test]
    fn scale_probe_is_rate_limited() {
        let g = PriceGuard::new();
        assert!(g.try_prime_scale("BTCUSDT", 0));
        assert!(!g.try_prime_scale("BTCUSDT", 1_000));
        assert!(g.try_prime_scale("BTCUSDT", SCALE_PROBE_COOLDOWN_MS + 1));
    }
}
