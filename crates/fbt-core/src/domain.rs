//! Shared wire-adjacent domain types and the `Gateway` trait object contract.
//!
//! These types sit at the Gateway/OMS/Strategy boundary. Prices and
//! quantities are `i64` micros (see [`crate::micros`]); `f64` never appears
//! here. Both `PaperGateway` and `LiveGateway` implement [`Gateway`] so the
//! OMS and Strategy are venue-agnostic — they hold `Arc<dyn Gateway>` and
//! never match on a concrete venue type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FbtResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tif {
    Gtc,
    Ioc,
    Fok,
    PostOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Liquidity {
    Maker,
    Taker,
}

/// OrderRequest. Invariant: `qty > 0`; a `Limit` order requires `price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub r#type: OrderType,
    pub qty: i64,
    pub price: Option<i64>,
    pub tif: Tif,
    pub reduce_only: bool,
    pub post_only: bool,
    pub client_order_id: String,
}

impl OrderRequest {
    /// `Ok(())` iff the invariants in hold; callers should reject before
    /// this ever reaches a `Gateway`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.qty <= 0 {
            return Err("qty must be > 0");
        }
        if self.r#type == OrderType::Limit && self.price.is_none() {
            return Err("limit order requires price");
        }
        Ok(())
    }
}

/// OrderLifecycleState.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderLifecycleState {
    New,
    Sent,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderLifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderLifecycleState::Filled | OrderLifecycleState::Canceled | OrderLifecycleState::Rejected
        )
    }
}

/// Venue-synthesised order shape, returned by `place_order`/`get_open_orders`
/// and used by idempotent-duplicate lookups and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub state: OrderLifecycleState,
    pub qty: i64,
    pub filled_qty: i64,
    pub avg_price: Option<i64>,
    pub updated_ts_ms: i64,
}

/// ExecutionEvent (inbound, normalised).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub status: String,
    pub last_fill_qty: i64,
    pub cum_fill_qty: i64,
    pub avg_price: Option<i64>,
    pub fee: Option<i64>,
    pub fee_ccy: Option<String>,
    pub liquidity: Option<Liquidity>,
    pub updated_ts_ms: i64,
}

/// Per-symbol top-of-book cache. Invariant: `bid < ask` when both present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbo {
    pub bid: Option<i64>,
    pub ask: Option<i64>,
    pub ts_ms: i64,
}

impl Bbo {
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        now_ms - self.ts_ms > max_age_ms
    }

    pub fn mid(&self) -> Option<i64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / 2),
            _ => None,
        }
    }
}

/// InstrumentMeta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentMeta {
    pub price_scale: u32,
    pub tick_size: i64,
    pub qty_step_perp: i64,
    pub qty_step_spot: i64,
    pub min_qty_perp: i64,
    pub min_qty_spot: i64,
    pub min_notional_perp: i64,
    pub min_notional_spot: i64,
    pub multiplier: i64,
}

/// FundingInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FundingInfo {
    pub current_rate_e6: Option<i64>,
    pub predicted_rate_e6: Option<i64>,
    pub next_funding_time_ms: Option<i64>,
    pub interval_hours: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub asset: String,
    pub free: i64,
    pub locked: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub qty: i64,
    pub avg_price: i64,
}

/// The single choke-point through which OMS and Strategy reach a venue.
///
/// `PaperGateway` and `LiveGateway` both implement this trait; callers hold
/// `Arc<dyn Gateway>` and never match on the concrete type.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn place_order(&self, req: OrderRequest) -> FbtResult<Order>;
    async fn cancel_order(&self, client_order_id: &str) -> FbtResult<()>;
    async fn amend_order(&self, client_order_id: &str, new_price: i64) -> FbtResult<Order>;
    async fn get_open_orders(&self, symbol: &str) -> FbtResult<Vec<Order>>;
    async fn get_bbo(&self, symbol: &str) -> FbtResult<Bbo>;
    async fn get_instrument_meta(&self, symbol: &str) -> FbtResult<InstrumentMeta>;
    async fn get_funding_info(&self, symbol: &str) -> FbtResult<FundingInfo>;
    async fn get_balances(&self) -> FbtResult<Vec<Balance>>;
    async fn get_positions(&self) -> FbtResult<Vec<Position>>;
    /// One-shot signed call verifying credentials. Never panics on auth
    /// failure; callers surface `(false, message)` to ops checks.
    async fn auth_preflight(&self) -> (bool, String);
}
