//! Shared wire-shape DTOs exchanged between the Gateway, OMS, audit sink and
//! daemon API. These mirror the venue's wire format (prices/quantities as
//! canonical decimal strings) rather than the internal `i64`-micros
//! representation used in decision logic — conversion happens at the
//! boundary, in `fbt-oms::prices`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireTif {
    Gtc,
    Ioc,
    Fok,
    PostOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireOrderRequest {
    pub symbol: String,
    pub side: WireSide,
    pub r#type: WireOrderType,
    pub qty: String,
    pub price: Option<String>,
    pub tif: WireTif,
    pub reduce_only: bool,
    pub post_only: bool,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: WireSide,
    pub status: String,
    pub qty: String,
    pub filled_qty: String,
    pub avg_price: Option<String>,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireExecutionEvent {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub status: String,
    pub last_fill_qty: String,
    pub cum_fill_qty: String,
    pub avg_price: Option<String>,
    pub fee: Option<String>,
    pub fee_ccy: Option<String>,
    pub liquidity: Option<String>,
    pub updated_ts_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireInstrumentMeta {
    pub symbol: String,
    pub price_scale: u32,
    pub tick_size: String,
    pub qty_step_perp: String,
    pub qty_step_spot: String,
    pub min_qty_perp: String,
    pub min_qty_spot: String,
    pub min_notional_perp: String,
    pub min_notional_spot: String,
    pub multiplier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTicker {
    pub symbol: String,
    pub bid: Option<String>,
    pub ask: Option<String>,
    pub last: Option<String>,
    pub index: Option<String>,
    pub mark: Option<String>,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFundingInfo {
    pub symbol: String,
    pub current_rate: Option<String>,
    pub predicted_rate: Option<String>,
    pub next_funding_time_ms: Option<i64>,
    pub interval_hours: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePosition {
    pub symbol: String,
    pub qty: String,
    pub avg_price: String,
}
