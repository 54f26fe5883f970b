//! Cost model.
//!
//! Pure bps-based fee/slippage/spread functions over integer-micros values.
//! No side effects, no clock, no I/O. bps = basis points of notional
//! (1 bps = 0.0001). Intermediate products use `i128` to avoid overflow on
//! large notionals before scaling back down to `i64` micros.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Taker fee in quote micros for a given notional (quote micros) and venue
/// fee rate in bps.
pub fn taker_fee_quote(notional_micros: i64, venue_bps: i64) -> i64 {
    bps_of(notional_micros, venue_bps)
}

/// Slippage cost in quote micros for a given notional and slippage rate in
/// bps.
pub fn slippage_cost_quote(notional_micros: i64, slippage_bps: i64) -> i64 {
    bps_of(notional_micros, slippage_bps)
}

fn bps_of(notional_micros: i64, bps: i64) -> i64 {
    let product = (notional_micros as i128) * (bps as i128);
    let scaled = product / 10_000i128;
    scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Market fill price applying `(slippage_bps + extra_spread_bps)` as a
/// multiplicative adjustment away from the touch, with sign per side: BUY
/// fills worse (higher), SELL fills worse (lower). Falls back to `fallback`
/// when the relevant side of the book is unavailable.
pub fn market_fill_price(
    bid: Option<i64>,
    ask: Option<i64>,
    side: Side,
    slippage_bps: i64,
    extra_spread_bps: i64,
    fallback: i64,
) -> i64 {
    let touch = match side {
        Side::Buy => ask.unwrap_or(fallback),
        Side::Sell => bid.unwrap_or(fallback),
    };
    let total_bps = slippage_bps + extra_spread_bps;
    if total_bps == 0 {
        return touch;
    }
    let adjustment = (touch as i128 * total_bps as i128) / 10_000i128;
    match side {
        Side::Buy => (touch as i128 + adjustment).min(i64::MAX as i128) as i64,
        Side::Sell => (touch as i128 - adjustment).max(0) as i64,
    }
}

/// Round-trip cost in quote micros: 4 fee legs (open perp, open spot, close
/// perp, close spot) + 4 slippage legs, all computed against the same
/// `notional_micros` approximation (the common-step quantity keeps both legs
/// at materially the same notional in this strategy).
pub fn roundtrip_cost_quote(notional_micros: i64, venue_bps: i64, slippage_bps: i64) -> i64 {
    let fee_leg = taker_fee_quote(notional_micros, venue_bps);
    let slip_leg = slippage_cost_quote(notional_micros, slippage_bps);
    fee_leg.saturating_mul(4).saturating_add(slip_leg.saturating_mul(4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taker_fee_zero_notional_is_zero() {
        assert_eq!(taker_fee_quote(0, 10), 0);
    }

    #[test]
    fn taker_fee_ten_bps_of_one_unit() {
        // notional = 1_000_000 micros (1.0 unit), 10 bps => 1_000 micros
        assert_eq!(taker_fee_quote(1_000_000, 10), 1_000);
    }

    #[test]
    fn slippage_cost_matches_fee_formula() {
        assert_eq!(slippage_cost_quote(1_000_000, 5), 500);
    }

    #[test]
    fn market_fill_price_buy_is_worse_than_touch() {
        let px = market_fill_price(Some(99_000_000), Some(100_000_000), Side::Buy, 10, 0, 0);
        assert!(px > 100_000_000);
    }

    #[test]
    fn market_fill_price_sell_is_worse_than_touch() {
        let px = market_fill_price(Some(99_000_000), Some(100_000_000), Side::Sell, 10, 0, 0);
        assert!(px < 99_000_000);
    }

    #[test]
    fn market_fill_price_falls_back_when_side_missing() {
        let px = market_fill_price(None, None, Side::Buy, 0, 0, 42);
        assert_eq!(px, 42);
    }

    #[test]
    fn market_fill_price_zero_bps_returns_touch() {
        let px = market_fill_price(Some(10), Some(20), Side::Sell, 0, 0, 0);
        assert_eq!(px, 10);
    }

    #[test]
    fn roundtrip_cost_sums_four_fee_and_slippage_legs() {
        let cost = roundtrip_cost_quote(1_000_000, 10, 5);
        // 4 * 1000 (fee) + 4 * 500 (slippage) = 6000
        assert_eq!(cost, 6_000);
    }

    #[test]
    fn large_notional_does_not_overflow() {
        let big = i64::MAX / 2;
        let fee = taker_fee_quote(big, 10);
        assert!(fee > 0);
        let rt = roundtrip_cost_quote(big, 10, 10);
        assert!(rt > 0);
    }
}
