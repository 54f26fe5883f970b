use fbt_core::Side;

/// Holding: per-symbol spot/perp leg state for an open basis position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    pub spot_qty: i64,
    pub spot_px: i64,
    pub perp_qty: i64,
    pub perp_px: i64,
}

impl Holding {
    pub fn net_delta(&self) -> i64 {
        self.spot_qty + self.perp_qty
    }

    pub fn dominant_base_qty(&self) -> i64 {
        self.spot_qty.abs().max(self.perp_qty.abs())
    }

    /// Quote-currency notional in micros: `|spot_qty·spot_px| + |perp_qty·perp_px|`.
    pub fn notional_micros(&self) -> i64 {
        leg_notional_micros(self.spot_qty, self.spot_px) + leg_notional_micros(self.perp_qty, self.perp_px)
    }
}

pub fn leg_notional_micros(qty_micros: i64, price_micros: i64) -> i64 {
    ((qty_micros.unsigned_abs() as i128 * price_micros.unsigned_abs() as i128) / fbt_core::MICROS_PER_UNIT as i128) as i64
}

/// Decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Open {
        symbol: String,
        notional_micros: i64,
        perp_side: Side,
        spot_side: Side,
        predicted_apr_e6: Option<i64>,
    },
    Hedge {
        symbol: String,
        delta_to_neutral: i64,
        predicted_apr_e6: Option<i64>,
    },
    Close {
        symbol: String,
        predicted_apr_e6: Option<i64>,
    },
    Skip {
        symbol: String,
        reason: &'static str,
    },
}

impl Decision {
    pub fn symbol(&self) -> &str {
        match self {
            Decision::Open { symbol, .. } => symbol,
            Decision::Hedge { symbol, .. } => symbol,
            Decision::Close { symbol, .. } => symbol,
            Decision::Skip { symbol, .. } => symbol,
        }
    }
}

/// Strategy tunables, grounded in `FundingBasisStrategy`'s constructor
/// defaults (`period_seconds=8h`, `min_hold_periods=1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    pub symbols: Vec<String>,
    pub period_seconds: i64,
    pub min_hold_periods: i64,
    pub rebalance_band_bps: i64,
    pub min_expected_apr_e6: i64,
    pub taker_bps_roundtrip: i64,
    pub estimated_slippage_bps: i64,
    pub max_total_notional_micros: i64,
    pub max_symbol_notional_micros: i64,
}

impl StrategyConfig {
    pub fn conservative_defaults(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            period_seconds: 8 * 3_600,
            min_hold_periods: 1,
            rebalance_band_bps: 500,
            min_expected_apr_e6: 0,
            taker_bps_roundtrip: 0,
            estimated_slippage_bps: 0,
            max_total_notional_micros: 0,
            max_symbol_notional_micros: 0,
        }
    }
}

const YEAR_SECONDS: i64 = 365 * 24 * 3_600;

/// Annualized rate in micros: `rate · (year_seconds / period_seconds)`.
pub fn annualize_rate(rate_e6: i64, period_seconds: i64) -> i64 {
    if period_seconds <= 0 {
        return 0;
    }
    ((rate_e6 as i128 * YEAR_SECONDS as i128) / period_seconds as i128) as i64
}

/// `min(max_total − used_total, max_symbol − used_symbol)`.
pub fn notional_candidate(
    max_total_notional_micros: i64,
    used_total_notional_micros: i64,
    max_symbol_notional_micros: i64,
    used_symbol_notional_micros: i64,
) -> i64 {
    let room_total = max_total_notional_micros - used_total_notional_micros;
    let room_symbol = max_symbol_notional_micros - used_symbol_notional_micros;
    room_total.min(room_symbol)
}
