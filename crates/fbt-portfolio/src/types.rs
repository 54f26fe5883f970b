use fbt_core::Side;

/// A single execution to feed into a [`crate::RoundTripAggregator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price_micros: i64,
    pub fee_micros: i64,
    pub ts_ms: i64,
    pub client_order_id: String,
}

impl Fill {
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        qty: i64,
        price_micros: i64,
        fee_micros: i64,
        ts_ms: i64,
        client_order_id: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            qty,
            price_micros,
            fee_micros,
            ts_ms,
            client_order_id: client_order_id.into(),
        }
    }

    pub(crate) fn signed_qty(&self) -> i64 {
        match self.side {
            Side::Buy => self.qty,
            Side::Sell => -self.qty,
        }
    }
}

/// A completed entry-to-exit round trip.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoundTrip {
    pub symbol: String,
    pub direction: Direction,
    pub qty: i64,
    pub entry_ts_ms: i64,
    pub exit_ts_ms: i64,
    pub hold_secs: i64,
    pub entry_avg_px_micros: i64,
    pub exit_avg_px_micros: i64,
    pub gross_pnl_micros: i64,
    pub fees_open_micros: i64,
    pub fees_close_micros: i64,
    pub net_pnl_micros: i64,
    pub entry_client_order_ids: Vec<String>,
    pub exit_client_order_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub(crate) fn of_sign(sign: i64) -> Self {
        if sign > 0 {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    pub(crate) fn sign(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}
