//! [`ScriptedGateway`]: a configurable `Gateway` mock for OMS/Strategy unit
//! tests, generalized from the `AlwaysOkGateway` each component's own test
//! module otherwise hand-rolls (see `fbt-oms::engine::tests`).
//!
//! Every request succeeds by default with a deterministic synthetic `Order`;
//! callers override per-symbol BBO/instrument/funding responses and record
//! what was submitted via `placed()`/`canceled()`/`amended()`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fbt_core::{
    Balance, Bbo, FbtResult, FundingInfo, Gateway, InstrumentMeta, Order, OrderLifecycleState,
    OrderRequest, Position,
};

#[derive(Default)]
struct Scripts {
    bbo: HashMap<String, Bbo>,
    instruments: HashMap<String, InstrumentMeta>,
    funding: HashMap<String, FundingInfo>,
    open_orders: HashMap<String, Vec<Order>>,
    auth: (bool, String),
}

/// Records of every call the OMS/Strategy made against this gateway, for
/// assertions after the fact.
#[derive(Default)]
struct Recorded {
    placed: Vec<OrderRequest>,
    canceled: Vec<String>,
    amended: Vec<(String, i64)>,
}

pub struct ScriptedGateway {
    scripts: Mutex<Scripts>,
    recorded: Mutex<Recorded>,
    now_ms: i64,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Scripts { auth: (true, "ok".to_string()), ..Default::default() }),
            recorded: Mutex::new(Recorded::default()),
            now_ms: 0,
        }
    }

    pub fn with_bbo(self, symbol: &str, bbo: Bbo) -> Self {
        self.scripts.lock().unwrap().bbo.insert(symbol.to_string(), bbo);
        self
    }

    pub fn with_instrument_meta(self, symbol: &str, meta: InstrumentMeta) -> Self {
        self.scripts.lock().unwrap().instruments.insert(symbol.to_string(), meta);
        self
    }

    pub fn with_funding_info(self, symbol: &str, info: FundingInfo) -> Self {
        self.scripts.lock().unwrap().funding.insert(symbol.to_string(), info);
        self
    }

    pub fn with_open_orders(self, symbol: &str, orders: Vec<Order>) -> Self {
        self.scripts.lock().unwrap().open_orders.insert(symbol.to_string(), orders);
        self
    }

    pub fn with_auth(self, ok: bool, reason: &str) -> Self {
        self.scripts.lock().unwrap().auth = (ok, reason.to_string());
        self
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.recorded.lock().unwrap().placed.clone()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.recorded.lock().unwrap().canceled.clone()
    }

    pub fn amended(&self) -> Vec<(String, i64)> {
        self.recorded.lock().unwrap().amended.clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn place_order(&self, req: OrderRequest) -> FbtResult<Order> {
        let order = Order {
            client_order_id: req.client_order_id.clone(),
            exchange_order_id: Some(format!("scripted-{}", req.client_order_id)),
            symbol: req.symbol.clone(),
            side: req.side,
            state: OrderLifecycleState::Sent,
            qty: req.qty,
            filled_qty: 0,
            avg_price: None,
            updated_ts_ms: self.now_ms,
        };
        self.recorded.lock().unwrap().placed.push(req);
        Ok(order)
    }

    async fn cancel_order(&self, client_order_id: &str) -> FbtResult<()> {
        self.recorded.lock().unwrap().canceled.push(client_order_id.to_string());
        Ok(())
    }

    async fn amend_order(&self, client_order_id: &str, new_price: i64) -> FbtResult<Order> {
        self.recorded.lock().unwrap().amended.push((client_order_id.to_string(), new_price));
        Ok(Order {
            client_order_id: client_order_id.to_string(),
            exchange_order_id: None,
            symbol: String::new(),
            side: fbt_core::Side::Buy,
            state: OrderLifecycleState::Sent,
            qty: 0,
            filled_qty: 0,
            avg_price: Some(new_price),
            updated_ts_ms: self.now_ms,
        })
    }

    async fn get_open_orders(&self, symbol: &str) -> FbtResult<Vec<Order>> {
        Ok(self.scripts.lock().unwrap().open_orders.get(symbol).cloned().unwrap_or_default())
    }

    async fn get_bbo(&self, symbol: &str) -> FbtResult<Bbo> {
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .bbo
            .get(symbol)
            .copied()
            .unwrap_or(Bbo { bid: Some(99_000_000), ask: Some(100_000_000), ts_ms: self.now_ms }))
    }

    async fn get_instrument_meta(&self, symbol: &str) -> FbtResult<InstrumentMeta> {
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .instruments
            .get(symbol)
            .copied()
            .unwrap_or(crate::fixtures::InstrumentMetaFixture::new().build()))
    }

    async fn get_funding_info(&self, symbol: &str) -> FbtResult<FundingInfo> {
        Ok(self.scripts.lock().unwrap().funding.get(symbol).copied().unwrap_or_default())
    }

    async fn get_balances(&self) -> FbtResult<Vec<Balance>> {
        Ok(Vec::new())
    }

    async fn get_positions(&self) -> FbtResult<Vec<Position>> {
        Ok(Vec::new())
    }

    async fn auth_preflight(&self) -> (bool, String) {
        self.scripts.lock().unwrap().auth.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbt_core::{OrderType, Side, Tif};

    fn req(id: &str) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            r#type: OrderType::Market,
            qty: 10,
            price: None,
            tif: Tif::Ioc,
            reduce_only: false,
            post_only: false,
            client_order_id: id.into(),
        }
    }

    #[tokio::test]
    async fn place_order_records_the_request_and_acks_sent() {
        let gw = ScriptedGateway::new();
        let order = gw.place_order(req("a")).await.unwrap();
        assert_eq!(order.state, OrderLifecycleState::Sent);
        assert_eq!(gw.placed().len(), 1);
    }

    #[tokio::test]
    async fn scripted_bbo_overrides_the_default() {
        let gw = ScriptedGateway::new().with_bbo("ETHUSDT", Bbo { bid: Some(1), ask: Some(2), ts_ms: 7 });
        let bbo = gw.get_bbo("ETHUSDT").await.unwrap();
        assert_eq!(bbo.ts_ms, 7);

        let default_bbo = gw.get_bbo("BTCUSDT").await.unwrap();
        assert!(default_bbo.bid.unwrap() < default_bbo.ask.unwrap());
    }

    #[tokio::test]
    async fn auth_preflight_reports_the_scripted_result() {
        let gw = ScriptedGateway::new().with_auth(false, "no key configured");
        let (ok, reason) = gw.auth_preflight().await;
        assert!(!ok);
        assert_eq!(reason, "no key configured");
    }

    #[tokio::test]
    async fn cancel_and_amend_are_recorded() {
        let gw = ScriptedGateway::new();
        gw.cancel_order("x").await.unwrap();
        gw.amend_order("y", 12_345).await.unwrap();
        assert_eq!(gw.canceled(), vec!["x".to_string()]);
        assert_eq!(gw.amended(), vec![("y".to_string(), 12_345)]);
    }
}
