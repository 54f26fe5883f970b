//! Backtest replayer: feeds time-ordered ticks and a funding schedule into
//! the Paper Exchange, drives the strategy on a fixed cadence, and folds
//! fills through the round-trip aggregator for a PnL report.
//!
//! Deterministic single pass over time-ordered input, no lookahead: a
//! tick->strategy->execution->portfolio->risk pipeline, pointed at ticks and
//! funding events instead of OHLC bars.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use fbt_core::{FundingInfo, Gateway, InstrumentMeta, MonoClock, Side};
use fbt_gateway_paper::PaperGateway;
use fbt_oms::{Oms, OmsAuditEvent, OmsConfig};
use fbt_portfolio::{Fill, RoundTripAggregator, RoundTripError};
use fbt_risk::{RiskConfig, RiskManager};
use fbt_strategy::{FundingBasisStrategy, StrategyConfig};

use crate::types::{BacktestConfig, BacktestReport, FundingEvent, Tick};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktestError {
    Strategy(String),
    Portfolio(String),
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strategy(msg) => write!(f, "backtest strategy error: {msg}"),
            Self::Portfolio(msg) => write!(f, "backtest portfolio error: {msg}"),
        }
    }
}

impl std::error::Error for BacktestError {}

impl From<RoundTripError> for BacktestError {
    fn from(e: RoundTripError) -> Self {
        Self::Portfolio(e.to_string())
    }
}

fn leg_notional_micros(qty_micros: i64, price_micros: i64) -> i64 {
    ((qty_micros.unsigned_abs() as i128 * price_micros.unsigned_abs() as i128) / fbt_core::MICROS_PER_UNIT as i128)
        as i64
}

/// Funding settlement on an open position: longs pay, shorts receive.
fn funding_settlement_micros(signed_qty: i64, last_px_micros: i64, rate_e6: i64) -> i64 {
    if signed_qty == 0 || last_px_micros <= 0 {
        return 0;
    }
    let notional = leg_notional_micros(signed_qty, last_px_micros);
    let amount = ((rate_e6 as i128 * notional as i128) / fbt_core::MICROS_PER_UNIT as i128) as i64;
    if signed_qty > 0 {
        -amount
    } else {
        amount
    }
}

pub struct BacktestEngine {
    paper: Arc<PaperGateway>,
    oms: Arc<Oms>,
    strategy: Arc<FundingBasisStrategy>,
    symbols: Vec<String>,
    cfg: BacktestConfig,
    sim_now: Arc<Mutex<i64>>,
    order_symbols: Arc<Mutex<HashMap<String, (String, Side)>>>,
    pending_fills: Arc<Mutex<Vec<Fill>>>,
    exec_rx: tokio::sync::mpsc::UnboundedReceiver<fbt_core::ExecutionEvent>,
}

impl BacktestEngine {
    pub fn new(
        instruments: HashMap<String, InstrumentMeta>,
        strategy_cfg: StrategyConfig,
        risk_cfg: RiskConfig,
        oms_cfg: OmsConfig,
        cfg: BacktestConfig,
    ) -> Self {
        let symbols = strategy_cfg.symbols.clone();
        let sim_now = Arc::new(Mutex::new(0i64));
        let clock: MonoClock = {
            let sim_now = sim_now.clone();
            Arc::new(move || *sim_now.lock().unwrap())
        };

        let (paper, exec_rx) = PaperGateway::new(instruments, clock.clone());
        let paper = Arc::new(paper);

        let order_symbols: Arc<Mutex<HashMap<String, (String, Side)>>> = Arc::new(Mutex::new(HashMap::new()));
        let pending_fills: Arc<Mutex<Vec<Fill>>> = Arc::new(Mutex::new(Vec::new()));

        let sink_order_symbols = order_symbols.clone();
        let sink_pending_fills = pending_fills.clone();
        let sink_sim_now = sim_now.clone();

        let gateway_for_oms: Arc<dyn Gateway> = paper.clone();
        let oms = Oms::new(gateway_for_oms, clock.clone(), oms_cfg).with_audit_sink(move |ev| match ev {
            OmsAuditEvent::OrderNew { client_order_id, symbol, side, .. } => {
                sink_order_symbols.lock().unwrap().insert(client_order_id, (symbol, side));
            }
            OmsAuditEvent::TradeFill { client_order_id, fill_qty, price, fee } => {
                let Some((symbol, side)) = sink_order_symbols.lock().unwrap().get(&client_order_id).cloned() else {
                    return;
                };
                let ts_ms = *sink_sim_now.lock().unwrap();
                sink_pending_fills.lock().unwrap().push(Fill::new(
                    symbol,
                    side,
                    fill_qty,
                    price.unwrap_or(0),
                    fee.unwrap_or(0),
                    ts_ms,
                    client_order_id,
                ));
            }
            _ => {}
        });
        let oms = Arc::new(oms);

        let risk = Arc::new(RiskManager::new(risk_cfg));
        let gateway_for_strategy: Arc<dyn Gateway> = paper.clone();
        let strategy = Arc::new(FundingBasisStrategy::new(gateway_for_strategy, oms.clone(), risk, strategy_cfg));

        Self { paper, oms, strategy, symbols, cfg, sim_now, order_symbols, pending_fills, exec_rx }
    }

    /// Drain whatever execution events the Paper Exchange has already
    /// synthesized, feeding each into the OMS (mirroring how a private WS
    /// frame would arrive in production).
    async fn drain_execution_events(&mut self) -> Result<(), BacktestError> {
        while let Ok(ev) = self.exec_rx.try_recv() {
            self.oms
                .on_execution_event(ev)
                .await
                .map_err(|e| BacktestError::Strategy(e.to_string()))?;
        }
        Ok(())
    }

    fn drain_fills_into(
        &self,
        aggregator: &mut RoundTripAggregator,
        round_trips: &mut Vec<fbt_portfolio::RoundTrip>,
        fees_micros: &mut i64,
    ) -> Result<(), BacktestError> {
        let fills: Vec<Fill> = std::mem::take(&mut *self.pending_fills.lock().unwrap());
        for fill in fills {
            *fees_micros += fill.fee_micros.max(0);
            if let Some(rt) = aggregator.on_fill(&fill)? {
                round_trips.push(rt);
            }
        }
        Ok(())
    }

    /// Drive one strategy evaluation across every configured symbol at the
    /// current simulated time.
    async fn step(
        &mut self,
        pending_funding: &HashMap<String, VecDeque<FundingEvent>>,
        last_px: &HashMap<String, i64>,
    ) -> Result<(), BacktestError> {
        for symbol in self.symbols.clone() {
            let px = *last_px.get(&symbol).unwrap_or(&0);
            let funding_info = pending_funding
                .get(&symbol)
                .and_then(|q| q.front())
                .map(|fe| FundingInfo {
                    current_rate_e6: None,
                    predicted_rate_e6: Some(fe.rate_e6),
                    next_funding_time_ms: Some(fe.ts_ms),
                    interval_hours: None,
                })
                .unwrap_or(FundingInfo {
                    current_rate_e6: None,
                    predicted_rate_e6: None,
                    next_funding_time_ms: None,
                    interval_hours: None,
                });

            let decision = self.strategy.evaluate(&symbol, &funding_info, px, px);
            self.strategy
                .execute(&decision)
                .await
                .map_err(|e| BacktestError::Strategy(e.to_string()))?;
            self.drain_execution_events().await?;
        }
        Ok(())
    }

    /// Replay `ticks` (need not be pre-sorted) and apply `funding_schedule`
    /// along the way, returning the aggregated PnL report.
    pub async fn run(
        &mut self,
        mut ticks: Vec<Tick>,
        funding_schedule: Vec<FundingEvent>,
    ) -> Result<BacktestReport, BacktestError> {
        ticks.sort_by_key(|t| t.ts_ms);

        let mut by_symbol: HashMap<String, VecDeque<FundingEvent>> = HashMap::new();
        let mut sorted_funding = funding_schedule;
        sorted_funding.sort_by_key(|f| f.ts_ms);
        for fe in sorted_funding {
            by_symbol.entry(fe.symbol.clone()).or_default().push_back(fe);
        }

        let mut aggregator = RoundTripAggregator::new();
        let mut round_trips = Vec::new();
        let mut fees_micros = 0i64;
        let mut funding_pnl_micros = 0i64;
        let mut funding_events_applied = 0usize;
        let mut last_px: HashMap<String, i64> = HashMap::new();
        let mut last_step_ts = i64::MIN;

        for tick in &ticks {
            *self.sim_now.lock().unwrap() = tick.ts_ms;
            self.paper.update_bbo(&tick.symbol, Some(tick.bid_micros), Some(tick.ask_micros), tick.ts_ms);
            self.paper.update_last_trade(&tick.symbol, tick.last_micros);
            last_px.insert(tick.symbol.clone(), tick.last_micros);

            if let Some(queue) = by_symbol.get_mut(&tick.symbol) {
                while let Some(front) = queue.front() {
                    if front.ts_ms > tick.ts_ms {
                        break;
                    }
                    let fe = queue.pop_front().expect("front just peeked");
                    let signed_qty = aggregator.open_position_signed_qty(&fe.symbol);
                    let px = *last_px.get(&fe.symbol).unwrap_or(&0);
                    funding_pnl_micros += funding_settlement_micros(signed_qty, px, fe.rate_e6);
                    funding_events_applied += 1;
                }
            }

            if tick.ts_ms.saturating_sub(last_step_ts) >= self.cfg.step_sec * 1_000 {
                last_step_ts = tick.ts_ms;
                self.step(&by_symbol, &last_px).await?;
            }

            self.drain_execution_events().await?;
            self.drain_fills_into(&mut aggregator, &mut round_trips, &mut fees_micros)?;
        }

        if self.cfg.flatten_at_end {
            self.strategy.flatten_all().await;
            self.drain_execution_events().await?;
            self.drain_fills_into(&mut aggregator, &mut round_trips, &mut fees_micros)?;
        }

        let trading_pnl_micros: i64 = round_trips.iter().map(|rt| rt.gross_pnl_micros).sum();
        let net_pnl_micros = funding_pnl_micros + trading_pnl_micros - fees_micros;

        Ok(BacktestReport {
            funding_pnl_micros,
            trading_pnl_micros,
            fees_micros,
            net_pnl_micros,
            round_trips,
            funding_events_applied,
            last_prices: last_px.into_iter().collect(),
        })
    }

    pub fn order_symbols_seen(&self) -> usize {
        self.order_symbols.lock().unwrap().len()
    }
}
