//! Paper Exchange — a deterministic in-memory fill simulator.
//!
//! Implements the same [`fbt_core::Gateway`] trait as the live venue binding
//! so OMS and Strategy cannot distinguish it. Holds `{orders, positions,
//! balances}` and a BBO table fed from replayed public frames, guarded by a
//! single `std::sync::Mutex` so BBO updates and fill scans interleave
//! atomically (no `.await` happens while the lock is held).
//!
//! Fills are synthesised synchronously inside `place_order`/`amend_order`
//! and pushed as [`ExecutionEvent`]s onto an unbounded channel; the Runner
//! wires the receiving end into `Oms::on_execution_event`, mirroring how a
//! real private WS frame would arrive.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use fbt_core::{
    round_down_to_step, round_to_tick, Balance, Bbo, ExecutionEvent, FbtError, FbtResult,
    FundingInfo, Gateway, InstrumentMeta, MonoClock, Order, OrderLifecycleState, OrderRequest,
    OrderType, Position, Side,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

struct PaperState {
    bbo: HashMap<String, Bbo>,
    last_trade: HashMap<String, i64>,
    funding: HashMap<String, FundingInfo>,
    orders: BTreeMap<String, Order>,
    positions: HashMap<String, Position>,
    balances: HashMap<String, Balance>,
}

impl PaperState {
    fn new() -> Self {
        Self {
            bbo: HashMap::new(),
            last_trade: HashMap::new(),
            funding: HashMap::new(),
            orders: BTreeMap::new(),
            positions: HashMap::new(),
            balances: HashMap::new(),
        }
    }
}

pub struct PaperGateway {
    instruments: HashMap<String, InstrumentMeta>,
    state: Mutex<PaperState>,
    events_tx: UnboundedSender<ExecutionEvent>,
    clock: MonoClock,
}

impl PaperGateway {
    /// Returns the gateway and the receiving end of its execution-event
    /// channel — wire the latter into `Oms::on_execution_event`.
    pub fn new(
        instruments: HashMap<String, InstrumentMeta>,
        clock: MonoClock,
    ) -> (Self, UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                instruments,
                state: Mutex::new(PaperState::new()),
                events_tx: tx,
                clock,
            },
            rx,
        )
    }

    /// Feed a replayed public-WS or backtest tick into the BBO cache.
    pub fn update_bbo(&self, symbol: &str, bid: Option<i64>, ask: Option<i64>, ts_ms: i64) {
        let mut state = self.state.lock().unwrap();
        state.bbo.insert(symbol.to_string(), Bbo { bid, ask, ts_ms });
    }

    pub fn update_last_trade(&self, symbol: &str, price: i64) {
        let mut state = self.state.lock().unwrap();
        state.last_trade.insert(symbol.to_string(), price);
    }

    pub fn update_funding(&self, symbol: &str, info: FundingInfo) {
        let mut state = self.state.lock().unwrap();
        state.funding.insert(symbol.to_string(), info);
    }

    pub fn seed_balance(&self, asset: &str, free: i64, locked: i64) {
        let mut state = self.state.lock().unwrap();
        state.balances.insert(
            asset.to_string(),
            Balance {
                asset: asset.to_string(),
                free,
                locked,
            },
        );
    }

    pub fn seed_position(&self, symbol: &str, qty: i64, avg_price: i64) {
        let mut state = self.state.lock().unwrap();
        state.positions.insert(symbol.to_string(), Position { qty, avg_price });
    }

    fn quantize(&self, req: &OrderRequest) -> FbtResult<(i64, Option<i64>)> {
        let meta = self
            .instruments
            .get(&req.symbol)
            .ok_or_else(|| FbtError::InvalidRequest(format!("unknown instrument {}", req.symbol)))?;
        let is_spot = req.symbol.ends_with("_SPOT");
        let qty_step = if is_spot { meta.qty_step_spot } else { meta.qty_step_perp };
        let min_qty = if is_spot { meta.min_qty_spot } else { meta.min_qty_perp };
        let qty = round_down_to_step(req.qty, qty_step);
        if qty < min_qty {
            return Err(FbtError::InvalidRequest(format!(
                "qty {qty} below min_qty {min_qty} after quantisation"
            )));
        }
        let price = req.price.map(|p| round_to_tick(p, meta.tick_size));
        Ok((qty, price))
    }

    fn fallback_price(&self, state: &PaperState, symbol: &str) -> Option<i64> {
        state
            .bbo
            .get(symbol)
            .and_then(|b| b.mid())
            .or_else(|| state.last_trade.get(symbol).copied())
    }

    fn market_fill_price(&self, state: &PaperState, symbol: &str, side: Side) -> Option<i64> {
        let bbo = state.bbo.get(symbol);
        match side {
            Side::Buy => bbo
                .and_then(|b| b.ask)
                .or_else(|| self.fallback_price(state, symbol)),
            Side::Sell => bbo
                .and_then(|b| b.bid)
                .or_else(|| self.fallback_price(state, symbol)),
        }
    }

    fn crosses(&self, state: &PaperState, symbol: &str, side: Side, price: i64) -> bool {
        let Some(bbo) = state.bbo.get(symbol) else {
            return false;
        };
        match side {
            Side::Buy => bbo.ask.map(|ask| price >= ask).unwrap_or(false),
            Side::Sell => bbo.bid.map(|bid| price <= bid).unwrap_or(false),
        }
    }

    fn apply_fill(&self, state: &mut PaperState, symbol: &str, side: Side, qty: i64, price: i64) {
        if symbol.ends_with("_SPOT") {
            let base = symbol.trim_end_matches("_SPOT").to_string();
            let pos = state.positions.entry(symbol.to_string()).or_insert(Position {
                qty: 0,
                avg_price: price,
            });
            let signed = match side {
                Side::Buy => qty,
                Side::Sell => -qty,
            };
            pos.qty += signed;
            let notional = (qty as i128 * price as i128 / fbt_core::MICROS_PER_UNIT as i128) as i64;
            let quote = state.balances.entry("USDT".to_string()).or_insert(Balance {
                asset: "USDT".into(),
                free: 0,
                locked: 0,
            });
            match side {
                Side::Buy => quote.free -= notional,
                Side::Sell => quote.free += notional,
            }
            let base_bal = state.balances.entry(base).or_insert(Balance {
                asset: symbol.trim_end_matches("_SPOT").to_string(),
                free: 0,
                locked: 0,
            });
            base_bal.free += signed;
        } else {
            let pos = state
                .positions
                .entry(symbol.to_string())
                .or_insert(Position { qty: 0, avg_price: 0 });
            update_weighted_avg(pos, side, qty, price);
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn update_weighted_avg(pos: &mut Position, side: Side, qty: i64, price: i64) {
    let signed = match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    };
    if pos.qty == 0 {
        pos.qty = signed;
        pos.avg_price = price;
        return;
    }
    let same_direction = (pos.qty > 0) == (signed > 0);
    if same_direction {
        let old_abs = pos.qty.unsigned_abs() as i128;
        let add_abs = qty as i128;
        let total = old_abs + add_abs;
        let new_avg = (old_abs * pos.avg_price as i128 + add_abs * price as i128) / total;
        pos.qty += signed;
        pos.avg_price = new_avg as i64;
    } else {
        let remaining_after = pos.qty + signed;
        if remaining_after == 0 {
            pos.qty = 0;
            pos.avg_price = 0;
        } else if (remaining_after > 0) == (pos.qty > 0) {
            pos.qty = remaining_after;
        } else {
            pos.qty = remaining_after;
            pos.avg_price = price;
        }
    }
}

#[async_trait]
impl Gateway for PaperGateway {
    async fn place_order(&self, req: OrderRequest) -> FbtResult<Order> {
        req.validate().map_err(|m| FbtError::InvalidRequest(m.to_string()))?;
        let (qty, price) = self.quantize(&req)?;
        let now = (self.clock)();

        let mut state = self.state.lock().unwrap();

        if let Some(existing) = state.orders.get(&req.client_order_id) {
            return Ok(existing.clone());
        }

        let fill_price = match req.r#type {
            OrderType::Market => self.market_fill_price(&state, &req.symbol, req.side),
            OrderType::Limit => {
                let p = price.expect("validated: limit requires price");
                if self.crosses(&state, &req.symbol, req.side, p) {
                    Some(p)
                } else {
                    None
                }
            }
        };

        let order = match fill_price {
            Some(fill_px) => {
                self.apply_fill(&mut state, &req.symbol, req.side, qty, fill_px);
                let filled = Order {
                    client_order_id: req.client_order_id.clone(),
                    exchange_order_id: Some(req.client_order_id.clone()),
                    symbol: req.symbol.clone(),
                    side: req.side,
                    state: OrderLifecycleState::Filled,
                    qty,
                    filled_qty: qty,
                    avg_price: Some(fill_px),
                    updated_ts_ms: now,
                };
                state.orders.insert(req.client_order_id.clone(), filled.clone());
                self.emit(ExecutionEvent {
                    client_order_id: req.client_order_id.clone(),
                    exchange_order_id: filled.exchange_order_id.clone(),
                    status: "filled".into(),
                    last_fill_qty: qty,
                    cum_fill_qty: qty,
                    avg_price: Some(fill_px),
                    fee: None,
                    fee_ccy: None,
                    liquidity: None,
                    updated_ts_ms: now,
                });
                filled
            }
            None => {
                let resting = Order {
                    client_order_id: req.client_order_id.clone(),
                    exchange_order_id: Some(req.client_order_id.clone()),
                    symbol: req.symbol.clone(),
                    side: req.side,
                    state: OrderLifecycleState::Sent,
                    qty,
                    filled_qty: 0,
                    avg_price: None,
                    updated_ts_ms: now,
                };
                state.orders.insert(req.client_order_id.clone(), resting.clone());
                resting
            }
        };
        Ok(order)
    }

    async fn cancel_order(&self, client_order_id: &str) -> FbtResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(order) = state.orders.get_mut(client_order_id) {
            if !order.state.is_terminal() {
                order.state = OrderLifecycleState::Canceled;
            }
        }
        Ok(())
    }

    async fn amend_order(&self, client_order_id: &str, new_price: i64) -> FbtResult<Order> {
        let now = (self.clock)();
        let mut state = self.state.lock().unwrap();
        let Some(order) = state.orders.get(client_order_id).cloned() else {
            return Err(FbtError::InvalidRequest(format!("unknown order {client_order_id}")));
        };
        if order.state.is_terminal() {
            return Ok(order);
        }
        let remaining = order.qty - order.filled_qty;
        if self.crosses(&state, &order.symbol, order.side, new_price) {
            self.apply_fill(&mut state, &order.symbol, order.side, remaining, new_price);
            let filled = Order {
                state: OrderLifecycleState::Filled,
                filled_qty: order.qty,
                avg_price: Some(new_price),
                updated_ts_ms: now,
                ..order
            };
            state.orders.insert(client_order_id.to_string(), filled.clone());
            self.emit(ExecutionEvent {
                client_order_id: client_order_id.to_string(),
                exchange_order_id: filled.exchange_order_id.clone(),
                status: "filled".into(),
                last_fill_qty: remaining,
                cum_fill_qty: filled.filled_qty,
                avg_price: Some(new_price),
                fee: None,
                fee_ccy: None,
                liquidity: None,
                updated_ts_ms: now,
            });
            Ok(filled)
        } else {
            let amended = Order {
                updated_ts_ms: now,
                ..order
            };
            state.orders.insert(client_order_id.to_string(), amended.clone());
            Ok(amended)
        }
    }

    async fn get_open_orders(&self, symbol: &str) -> FbtResult<Vec<Order>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .values()
            .filter(|o| o.symbol == symbol && !o.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn get_bbo(&self, symbol: &str) -> FbtResult<Bbo> {
        let state = self.state.lock().unwrap();
        state
            .bbo
            .get(symbol)
            .copied()
            .ok_or_else(|| FbtError::DataError(format!("no bbo for {symbol}")))
    }

    async fn get_instrument_meta(&self, symbol: &str) -> FbtResult<InstrumentMeta> {
        self.instruments
            .get(symbol)
            .copied()
            .ok_or_else(|| FbtError::InvalidRequest(format!("unknown instrument {symbol}")))
    }

    async fn get_funding_info(&self, symbol: &str) -> FbtResult<FundingInfo> {
        let state = self.state.lock().unwrap();
        Ok(state.funding.get(symbol).copied().unwrap_or_default())
    }

    async fn get_balances(&self) -> FbtResult<Vec<Balance>> {
        let state = self.state.lock().unwrap();
        Ok(state.balances.values().cloned().collect())
    }

    async fn get_positions(&self) -> FbtResult<Vec<Position>> {
        let state = self.state.lock().unwrap();
        Ok(state.positions.values().copied().collect())
    }

    async fn auth_preflight(&self) -> (bool, String) {
        (true, "paper gateway: no credentials required".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbt_core::{OrderType, Tif};
    use std::sync::Arc;

    fn meta() -> InstrumentMeta {
        InstrumentMeta {
            price_scale: 2,
            tick_size: 10_000,
            qty_step_perp: 1_000,
            qty_step_spot: 1_000,
            min_qty_perp: 1_000,
            min_qty_spot: 1_000,
            min_notional_perp: 0,
            min_notional_spot: 0,
            multiplier: fbt_core::MICROS_PER_UNIT,
        }
    }

    fn gw() -> (PaperGateway, UnboundedReceiver<ExecutionEvent>) {
        let mut instruments = HashMap::new();
        instruments.insert("BTCUSDT".to_string(), meta());
        PaperGateway::new(instruments, Arc::new(|| 0))
    }

    fn market_req(side: Side, qty: i64, id: &str) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".into(),
            side,
            r#type: OrderType::Market,
            qty,
            price: None,
            tif: Tif::Ioc,
            reduce_only: false,
            post_only: false,
            client_order_id: id.into(),
        }
    }

    #[tokio::test]
    async fn market_buy_fills_at_ask() {
        let (gw, mut rx) = gw();
        gw.update_bbo("BTCUSDT", Some(99_000_000), Some(100_000_000), 0);
        let order = gw.place_order(market_req(Side::Buy, 1_000_000, "a")).await.unwrap();
        assert_eq!(order.state, OrderLifecycleState::Filled);
        assert_eq!(order.avg_price, Some(100_000_000));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.cum_fill_qty, 1_000_000);
    }

    #[tokio::test]
    async fn limit_order_rests_when_not_crossing() {
        let (gw, _rx) = gw();
        gw.update_bbo("BTCUSDT", Some(99_000_000), Some(100_000_000), 0);
        let req = OrderRequest {
            r#type: OrderType::Limit,
            price: Some(90_000_000),
            tif: Tif::Gtc,
            ..market_req(Side::Buy, 1_000_000, "b")
        };
        let order = gw.place_order(req).await.unwrap();
        assert_eq!(order.state, OrderLifecycleState::Sent);
    }

    #[tokio::test]
    async fn limit_order_fills_when_crossing() {
        let (gw, _rx) = gw();
        gw.update_bbo("BTCUSDT", Some(99_000_000), Some(100_000_000), 0);
        let req = OrderRequest {
            r#type: OrderType::Limit,
            price: Some(101_000_000),
            tif: Tif::Gtc,
            ..market_req(Side::Buy, 1_000_000, "c")
        };
        let order = gw.place_order(req).await.unwrap();
        assert_eq!(order.state, OrderLifecycleState::Filled);
    }

    #[tokio::test]
    async fn submit_is_idempotent_on_duplicate_client_order_id() {
        let (gw, _rx) = gw();
        gw.update_bbo("BTCUSDT", Some(99_000_000), Some(100_000_000), 0);
        let first = gw.place_order(market_req(Side::Buy, 1_000_000, "d")).await.unwrap();
        let second = gw.place_order(market_req(Side::Buy, 1_000_000, "d")).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn weighted_avg_updates_on_same_direction_adds() {
        let mut pos = Position {
            qty: 1_000_000,
            avg_price: 100_000_000,
        };
        update_weighted_avg(&mut pos, Side::Buy, 1_000_000, 110_000_000);
        assert_eq!(pos.qty, 2_000_000);
        assert_eq!(pos.avg_price, 105_000_000);
    }

    #[test]
    fn weighted_avg_flip_resets_basis() {
        let mut pos = Position {
            qty: 1_000_000,
            avg_price: 100_000_000,
        };
        update_weighted_avg(&mut pos, Side::Sell, 3_000_000, 90_000_000);
        assert_eq!(pos.qty, -2_000_000);
        assert_eq!(pos.avg_price, 90_000_000);
    }

    #[tokio::test]
    async fn cancel_on_resting_order_marks_canceled() {
        let (gw, _rx) = gw();
        gw.update_bbo("BTCUSDT", Some(99_000_000), Some(100_000_000), 0);
        let req = OrderRequest {
            r#type: OrderType::Limit,
            price: Some(90_000_000),
            tif: Tif::Gtc,
            ..market_req(Side::Buy, 1_000_000, "e")
        };
        gw.place_order(req).await.unwrap();
        gw.cancel_order("e").await.unwrap();
        let open = gw.get_open_orders("BTCUSDT").await.unwrap();
        assert!(open.is_empty());
    }
}
