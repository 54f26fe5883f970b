//! Per-symbol funding/basis strategy.
//!
//! `evaluate`/`execute` follow a fixed decision ladder: skip an unconfigured
//! symbol, close on missing/non-positive funding while holding, hedge on
//! delta drift, skip-and-hold, else gate a new open on risk/funding/
//! APR/notional-room/expected-gain-vs-cost — all over `i64` micros.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fbt_core::{FbtResult, FundingInfo, Gateway, OrderRequest, OrderType, Side, Tif};
use fbt_oms::Oms;
use fbt_risk::RiskManager;

use crate::types::{annualize_rate, leg_notional_micros, notional_candidate, Decision, Holding, StrategyConfig};

pub struct FundingBasisStrategy {
    gateway: Arc<dyn Gateway>,
    oms: Arc<Oms>,
    risk: Arc<RiskManager>,
    cfg: StrategyConfig,
    holdings: Mutex<HashMap<String, Holding>>,
    nonce: std::sync::atomic::AtomicU64,
}

impl FundingBasisStrategy {
    pub fn new(gateway: Arc<dyn Gateway>, oms: Arc<Oms>, risk: Arc<RiskManager>, cfg: StrategyConfig) -> Self {
        Self {
            gateway,
            oms,
            risk,
            cfg,
            holdings: Mutex::new(HashMap::new()),
            nonce: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    fn client_order_id(&self, symbol: &str, side: Side) -> String {
        let side_str = match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        fbt_oms::derive_client_order_id(symbol, side_str, self.next_nonce())
    }

    fn used_total_notional(&self) -> i64 {
        self.holdings.lock().unwrap().values().map(Holding::notional_micros).sum()
    }

    fn used_symbol_notional(&self, symbol: &str) -> i64 {
        self.holdings
            .lock()
            .unwrap()
            .get(symbol)
            .map(Holding::notional_micros)
            .unwrap_or(0)
    }

    /// Pure (aside from the risk-manager funding-flip feed): no I/O, no clock.
    pub fn evaluate(&self, symbol: &str, funding: &FundingInfo, spot_price: i64, perp_price: i64) -> Decision {
        if !self.cfg.symbols.iter().any(|s| s == symbol) {
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "symbol not configured",
            };
        }

        let predicted_rate = funding.predicted_rate_e6;
        if let Some(rate) = predicted_rate {
            self.risk.update_funding_predicted(symbol, rate);
        }
        let apr = predicted_rate.map(|r| annualize_rate(r, self.cfg.period_seconds));

        let holding = self.holdings.lock().unwrap().get(symbol).copied();
        if let Some(holding) = holding {
            let Some(rate) = predicted_rate else {
                return Decision::Close {
                    symbol: symbol.to_string(),
                    predicted_apr_e6: None,
                };
            };
            if rate <= 0 {
                return Decision::Close {
                    symbol: symbol.to_string(),
                    predicted_apr_e6: apr,
                };
            }

            let net_delta = holding.net_delta();
            let dominant = holding.dominant_base_qty();
            if dominant > 0 {
                let delta_bps = (net_delta.unsigned_abs() as i128 * 10_000) / dominant as i128;
                if delta_bps > self.cfg.rebalance_band_bps as i128 {
                    return Decision::Hedge {
                        symbol: symbol.to_string(),
                        delta_to_neutral: -net_delta,
                        predicted_apr_e6: apr,
                    };
                }
            }
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "holding, within rebalance band",
            };
        }

        if !self.risk.new_orders_allowed() {
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "new orders disabled by risk manager",
            };
        }

        let Some(rate) = predicted_rate else {
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "no funding prediction available",
            };
        };
        if rate <= 0 {
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "negative funding not a new-entry candidate",
            };
        }
        if let Some(apr) = apr {
            if apr < self.cfg.min_expected_apr_e6 {
                return Decision::Skip {
                    symbol: symbol.to_string(),
                    reason: "apr below threshold",
                };
            }
        }

        let candidate = notional_candidate(
            self.cfg.max_total_notional_micros,
            self.used_total_notional(),
            self.cfg.max_symbol_notional_micros,
            self.used_symbol_notional(symbol),
        );
        if candidate <= 0 {
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "no notional room",
            };
        }

        let expected_gain = (rate as i128 * candidate as i128 * self.cfg.min_hold_periods.max(1) as i128)
            / fbt_core::MICROS_PER_UNIT as i128;
        let expected_cost = fbt_cost::taker_fee_quote(candidate, self.cfg.taker_bps_roundtrip)
            + fbt_cost::slippage_cost_quote(candidate, self.cfg.estimated_slippage_bps);
        if expected_gain <= expected_cost as i128 {
            return Decision::Skip {
                symbol: symbol.to_string(),
                reason: "expected gain below cost",
            };
        }

        let _ = spot_price;
        let _ = perp_price;
        Decision::Open {
            symbol: symbol.to_string(),
            notional_micros: candidate,
            perp_side: Side::Sell,
            spot_side: Side::Buy,
            predicted_apr_e6: apr,
        }
    }

    pub async fn execute(&self, decision: &Decision) -> FbtResult<()> {
        match decision {
            Decision::Open {
                symbol,
                notional_micros,
                perp_side,
                spot_side,
                ..
            } => self.open(symbol, *notional_micros, *perp_side, *spot_side).await,
            Decision::Hedge {
                symbol,
                delta_to_neutral,
                ..
            } => self.hedge(symbol, *delta_to_neutral).await,
            Decision::Close { symbol, .. } => self.close(symbol).await,
            Decision::Skip { .. } => Ok(()),
        }
    }

    async fn open(&self, symbol: &str, notional_micros: i64, perp_side: Side, spot_side: Side) -> FbtResult<()> {
        let perp_meta = self.gateway.get_instrument_meta(symbol).await?;
        let bbo = self.gateway.get_bbo(symbol).await?;
        let Some(anchor_px) = bbo.mid() else {
            tracing::info!(symbol, "open skipped: no bbo mid available");
            return Ok(());
        };

        let qty_raw = ((notional_micros as i128) * fbt_core::MICROS_PER_UNIT as i128) / anchor_px as i128;
        let common_step = fbt_core::lcm(perp_meta.qty_step_perp, perp_meta.qty_step_spot);
        let qty = if common_step > 0 {
            fbt_core::round_down_to_step(qty_raw as i64, common_step)
        } else {
            qty_raw as i64
        };
        if qty <= 0 || qty < perp_meta.min_qty_perp || qty < perp_meta.min_qty_spot {
            tracing::info!(symbol, qty, "open skipped: qty below minimum after quantisation");
            return Ok(());
        }
        let notional_at_anchor = leg_notional_micros(qty, anchor_px);
        if notional_at_anchor < perp_meta.min_notional_perp || notional_at_anchor < perp_meta.min_notional_spot {
            tracing::info!(symbol, "open skipped: notional below venue minimum");
            return Ok(());
        }

        let perp_req = OrderRequest {
            symbol: symbol.to_string(),
            side: perp_side,
            r#type: OrderType::Market,
            qty,
            price: None,
            tif: Tif::Ioc,
            reduce_only: false,
            post_only: false,
            client_order_id: self.client_order_id(symbol, perp_side),
        };
        let spot_req = OrderRequest {
            symbol: format!("{symbol}_SPOT"),
            side: spot_side,
            r#type: OrderType::Market,
            qty,
            price: None,
            tif: Tif::Ioc,
            reduce_only: false,
            post_only: false,
            client_order_id: self.client_order_id(symbol, spot_side),
        };

        self.oms.submit(perp_req).await?;
        self.oms.submit(spot_req).await?;

        let perp_signed = if perp_side == Side::Buy { qty } else { -qty };
        let spot_signed = if spot_side == Side::Buy { qty } else { -qty };
        self.holdings.lock().unwrap().insert(
            symbol.to_string(),
            Holding {
                spot_qty: spot_signed,
                spot_px: anchor_px,
                perp_qty: perp_signed,
                perp_px: anchor_px,
            },
        );
        Ok(())
    }

    async fn hedge(&self, symbol: &str, delta_to_neutral: i64) -> FbtResult<()> {
        if delta_to_neutral == 0 {
            return Ok(());
        }
        let side = if delta_to_neutral > 0 { Side::Buy } else { Side::Sell };
        let qty = delta_to_neutral.abs();
        let req = OrderRequest {
            symbol: symbol.to_string(),
            side,
            r#type: OrderType::Market,
            qty,
            price: None,
            tif: Tif::Ioc,
            reduce_only: false,
            post_only: false,
            client_order_id: self.client_order_id(symbol, side),
        };
        self.oms.submit(req).await?;

        let mut holdings = self.holdings.lock().unwrap();
        if let Some(h) = holdings.get_mut(symbol) {
            h.perp_qty += delta_to_neutral;
        }
        Ok(())
    }

    async fn close(&self, symbol: &str) -> FbtResult<()> {
        let holding = self.holdings.lock().unwrap().get(symbol).copied();
        let Some(holding) = holding else {
            return Ok(());
        };

        if holding.perp_qty != 0 {
            let side = if holding.perp_qty > 0 { Side::Sell } else { Side::Buy };
            let req = OrderRequest {
                symbol: symbol.to_string(),
                side,
                r#type: OrderType::Market,
                qty: holding.perp_qty.abs(),
                price: None,
                tif: Tif::Ioc,
                reduce_only: true,
                post_only: false,
                client_order_id: self.client_order_id(symbol, side),
            };
            self.oms.submit(req).await?;
        }
        if holding.spot_qty != 0 {
            let side = if holding.spot_qty > 0 { Side::Sell } else { Side::Buy };
            let spot_symbol = format!("{symbol}_SPOT");
            let req = OrderRequest {
                symbol: spot_symbol,
                side,
                r#type: OrderType::Market,
                qty: holding.spot_qty.abs(),
                price: None,
                tif: Tif::Ioc,
                reduce_only: true,
                post_only: false,
                client_order_id: self.client_order_id(symbol, side),
            };
            self.oms.submit(req).await?;
        }

        self.holdings.lock().unwrap().remove(symbol);
        Ok(())
    }

    pub async fn flatten_all(&self) {
        let symbols: Vec<String> = self.holdings.lock().unwrap().keys().cloned().collect();
        for symbol in symbols {
            if let Err(e) = self.close(&symbol).await {
                tracing::error!(symbol, error = %e, "flatten_all: close failed");
            }
        }
    }

    pub fn is_flat(&self) -> bool {
        self.holdings.lock().unwrap().is_empty()
    }

    /// Registers `flatten_all`/the flat probe with the risk manager. Must be
    /// called once the strategy is wrapped in an `Arc` (cyclic-reference
    /// wiring: the risk manager needs a flatten callback that only exists
    /// once the strategy itself is constructed).
    pub fn bind_to_risk(self: &Arc<Self>, risk: &RiskManager) {
        let strategy = Arc::clone(self);
        risk.bind_flatten_all(Box::new(move || {
            let strategy = Arc::clone(&strategy);
            tokio::spawn(async move { strategy.flatten_all().await });
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fbt_core::{Balance, Bbo, FbtResult as Res, InstrumentMeta, MonoClock, Order, OrderLifecycleState, Position};

    struct StubGateway;

    #[async_trait]
    impl Gateway for StubGateway {
        async fn place_order(&self, req: OrderRequest) -> Res<Order> {
            Ok(Order {
                client_order_id: req.client_order_id,
                exchange_order_id: Some("x".into()),
                symbol: req.symbol,
                side: req.side,
                state: OrderLifecycleState::Filled,
                qty: req.qty,
                filled_qty: req.qty,
                avg_price: req.price.or(Some(100 * fbt_core::MICROS_PER_UNIT)),
                updated_ts_ms: 0,
            })
        }
        async fn cancel_order(&self, _client_order_id: &str) -> Res<()> {
            Ok(())
        }
        async fn amend_order(&self, _client_order_id: &str, _new_price: i64) -> Res<Order> {
            unimplemented!()
        }
        async fn get_open_orders(&self, _symbol: &str) -> Res<Vec<Order>> {
            Ok(vec![])
        }
        async fn get_bbo(&self, _symbol: &str) -> Res<Bbo> {
            Ok(Bbo {
                bid: Some(99 * fbt_core::MICROS_PER_UNIT),
                ask: Some(101 * fbt_core::MICROS_PER_UNIT),
                ts_ms: 0,
            })
        }
        async fn get_instrument_meta(&self, _symbol: &str) -> Res<InstrumentMeta> {
            Ok(InstrumentMeta {
                price_scale: 2,
                tick_size: 1_000,
                qty_step_perp: 1_000,
                qty_step_spot: 1_000,
                min_qty_perp: 1_000,
                min_qty_spot: 1_000,
                min_notional_perp: 0,
                min_notional_spot: 0,
                multiplier: fbt_core::MICROS_PER_UNIT,
            })
        }
        async fn get_funding_info(&self, _symbol: &str) -> Res<FundingInfo> {
            Ok(FundingInfo::default())
        }
        async fn get_balances(&self) -> Res<Vec<Balance>> {
            Ok(vec![])
        }
        async fn get_positions(&self) -> Res<Vec<Position>> {
            Ok(vec![])
        }
        async fn auth_preflight(&self) -> (bool, String) {
            (true, "ok".into())
        }
    }

    fn clock() -> MonoClock {
        Arc::new(|| 0)
    }

    fn strategy() -> FundingBasisStrategy {
        let gateway: Arc<dyn Gateway> = Arc::new(StubGateway);
        let oms = Arc::new(Oms::new(gateway.clone(), clock(), fbt_oms::OmsConfig::conservative_defaults()));
        let risk = Arc::new(RiskManager::new(fbt_risk::RiskConfig::conservative_defaults()));
        let cfg = StrategyConfig {
            max_total_notional_micros: 1_000_000 * fbt_core::MICROS_PER_UNIT,
            max_symbol_notional_micros: 1_000_000 * fbt_core::MICROS_PER_UNIT,
            ..StrategyConfig::conservative_defaults(vec!["BTCUSDT".to_string()])
        };
        FundingBasisStrategy::new(gateway, oms, risk, cfg)
    }

    fn funding(rate_e6: Option<i64>) -> FundingInfo {
        FundingInfo {
            current_rate_e6: rate_e6,
            predicted_rate_e6: rate_e6,
            next_funding_time_ms: None,
            interval_hours: Some(8),
        }
    }

    #[test]
    fn unconfigured_symbol_is_skipped() {
        let s = strategy();
        let d = s.evaluate("ETHUSDT", &funding(Some(100)), 100, 100);
        assert!(matches!(d, Decision::Skip { .. }));
    }

    #[test]
    fn negative_funding_skips_new_entry() {
        let s = strategy();
        let d = s.evaluate("BTCUSDT", &funding(Some(-100)), 100, 100);
        assert!(matches!(d, Decision::Skip { .. }));
    }

    #[test]
    fn missing_funding_with_no_holding_skips() {
        let s = strategy();
        let d = s.evaluate("BTCUSDT", &funding(None), 100, 100);
        assert!(matches!(d, Decision::Skip { .. }));
    }

    #[test]
    fn sufficient_positive_funding_opens() {
        let s = strategy();
        // 50bps per 8h period -> comfortably above a zero APR floor
        let d = s.evaluate("BTCUSDT", &funding(Some(5_000)), 100 * fbt_core::MICROS_PER_UNIT, 100 * fbt_core::MICROS_PER_UNIT);
        assert!(matches!(d, Decision::Open { .. }));
    }

    #[tokio::test]
    async fn open_then_missing_funding_closes() {
        let s = strategy();
        let open = s.evaluate("BTCUSDT", &funding(Some(5_000)), 100 * fbt_core::MICROS_PER_UNIT, 100 * fbt_core::MICROS_PER_UNIT);
        s.execute(&open).await.unwrap();
        assert!(!s.is_flat());

        let close_decision = s.evaluate("BTCUSDT", &funding(None), 100 * fbt_core::MICROS_PER_UNIT, 100 * fbt_core::MICROS_PER_UNIT);
        assert!(matches!(close_decision, Decision::Close { .. }));
        s.execute(&close_decision).await.unwrap();
        assert!(s.is_flat());
    }

    #[test]
    fn delta_within_band_holds() {
        let s = strategy();
        s.holdings.lock().unwrap().insert(
            "BTCUSDT".to_string(),
            Holding {
                spot_qty: 1_000_000,
                spot_px: 100_000_000,
                perp_qty: -1_000_000,
                perp_px: 100_000_000,
            },
        );
        let d = s.evaluate("BTCUSDT", &funding(Some(100)), 100_000_000, 100_000_000);
        assert!(matches!(d, Decision::Skip { .. }));
    }

    #[test]
    fn delta_beyond_band_hedges() {
        let s = FundingBasisStrategy::new(
            Arc::new(StubGateway),
            Arc::new(Oms::new(Arc::new(StubGateway), clock(), fbt_oms::OmsConfig::conservative_defaults())),
            Arc::new(RiskManager::new(fbt_risk::RiskConfig::conservative_defaults())),
            StrategyConfig {
                rebalance_band_bps: 10,
                ..StrategyConfig::conservative_defaults(vec!["BTCUSDT".to_string()])
            },
        );
        s.holdings.lock().unwrap().insert(
            "BTCUSDT".to_string(),
            Holding {
                spot_qty: 1_000_000,
                spot_px: 100_000_000,
                perp_qty: -900_000,
                perp_px: 100_000_000,
            },
        );
        let d = s.evaluate("BTCUSDT", &funding(Some(100)), 100_000_000, 100_000_000);
        assert!(matches!(d, Decision::Hedge { .. }));
    }
}
