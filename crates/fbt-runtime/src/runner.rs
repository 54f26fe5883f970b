//! Composition root. Builds the Gateway/OMS/Risk/Strategy/Portfolio
//! stack for one run, owns the concurrent task set, and drives the
//! flatten-on-exit shutdown drain.
//!
//! Construct a read-only venue data source, a Paper Exchange bound to it
//! (paper mode only), an OMS bound to whichever gateway actually executes,
//! a Risk Manager wired to the Strategy's `flatten_all`, then run the
//! public-WS task and the strategy loop concurrently until cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fbt_audit::AuditWriter;
use fbt_core::{FbtResult, Gateway, InstrumentMeta, MonoClock, OpsCheckRow};
use fbt_gateway_live::LiveGateway;
use fbt_gateway_paper::PaperGateway;
use fbt_oms::{Oms, OmsAuditEvent};
use fbt_portfolio::{Fill, RoundTripAggregator};
use fbt_risk::RiskManager;
use fbt_strategy::FundingBasisStrategy;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::{config, provenance::RunProvenance, tasks, ws};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Paper,
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Paper => "PAPER",
            RunMode::Live => "LIVE",
        }
    }
}

pub struct RunnerOpts {
    pub mode: RunMode,
    pub config_json: Value,
    pub venue_api_key: Option<String>,
    pub venue_api_secret: Option<String>,
    pub audit_path: std::path::PathBuf,
    pub audit_hash_chain: bool,
    pub flatten_on_exit: bool,
    pub flatten_drain_timeout: Duration,
    pub provenance: RunProvenance,
}

pub struct Runner {
    gateway_for_execution: Arc<dyn Gateway>,
    data_source: Arc<dyn Gateway>,
    live: Arc<LiveGateway>,
    paper: Option<Arc<PaperGateway>>,
    oms: Arc<Oms>,
    risk: Arc<RiskManager>,
    strategy: Arc<FundingBasisStrategy>,
    aggregator: Arc<Mutex<RoundTripAggregator>>,
    symbols: Vec<String>,
    mode: RunMode,
    clock: MonoClock,
    audit: Arc<std::sync::Mutex<AuditWriter>>,
    run_id: Uuid,
    cfg: Value,
    venue_api_secret: String,
    flatten_on_exit: bool,
    flatten_drain_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Runner {
    /// Bootstraps every component for one run. For `Paper` mode, `data_source`
    /// is a read-only `LiveGateway` used purely for public market data/funding
    /// (never `place_order`), feeding the `PaperExchange`. For `Live` mode,
    /// `data_source` and the execution gateway are the same `LiveGateway`.
    pub async fn bootstrap(opts: RunnerOpts) -> anyhow::Result<Self> {
        let clock: MonoClock = fbt_core::system_clock();
        let symbols = config::symbols_from_config(&opts.config_json);

        let venue_api_secret = opts.venue_api_secret.unwrap_or_default();
        let live_cfg = config::live_gateway_config_from_json(
            &opts.config_json,
            opts.venue_api_key.unwrap_or_default(),
            venue_api_secret.clone(),
        );
        let live = Arc::new(LiveGateway::new(live_cfg, clock.clone()));
        let data_source = live.clone() as Arc<dyn Gateway>;

        let mut audit = AuditWriter::new(&opts.audit_path, opts.audit_hash_chain)?;
        audit.append(
            opts.provenance.run_id,
            "runtime",
            "run_started",
            serde_json::json!({
                "mode": opts.mode.as_str(),
                "engine_id": opts.provenance.engine_id,
                "git_hash": opts.provenance.git_hash,
                "config_hash": opts.provenance.config_hash,
                "host_fingerprint": opts.provenance.host_fingerprint,
                "symbols": symbols,
            }),
        )?;
        let audit = Arc::new(std::sync::Mutex::new(audit));

        let aggregator = Arc::new(Mutex::new(RoundTripAggregator::new()));
        let risk_cfg = config::risk_config_from_json(&opts.config_json);
        let risk = Arc::new(RiskManager::new(risk_cfg));

        let oms_cfg = config::oms_config_from_json(&opts.config_json);

        let (gateway_for_execution, paper): (Arc<dyn Gateway>, Option<Arc<PaperGateway>>) = match opts.mode {
            RunMode::Live => (data_source.clone() as Arc<dyn Gateway>, None),
            RunMode::Paper => {
                let instruments = bootstrap_instruments(data_source.as_ref(), &symbols).await?;
                let (paper_gw, exec_rx) = PaperGateway::new(instruments, clock.clone());
                let paper_gw = Arc::new(paper_gw);
                spawn_execution_drain(paper_gw.clone(), exec_rx);
                (paper_gw.clone() as Arc<dyn Gateway>, Some(paper_gw))
            }
        };

        let oms_audit = audit.clone();
        let oms_run_id = opts.provenance.run_id;
        let oms_aggregator = aggregator.clone();
        let oms_risk = risk.clone();
        let order_symbols: Arc<std::sync::Mutex<HashMap<String, (String, fbt_core::Side)>>> =
            Arc::new(std::sync::Mutex::new(HashMap::new()));
        let sink_order_symbols = order_symbols.clone();
        let sink_clock = clock.clone();

        let oms = Oms::new(gateway_for_execution.clone(), clock.clone(), oms_cfg).with_audit_sink(move |ev| {
            if let Ok(mut w) = oms_audit.lock() {
                let payload = audit_event_json(&ev);
                let _ = w.append(oms_run_id, "oms", audit_event_type(&ev), payload);
            }
            match ev {
                OmsAuditEvent::OrderNew { client_order_id, symbol, side, .. } => {
                    sink_order_symbols.lock().unwrap().insert(client_order_id, (symbol, side));
                }
                OmsAuditEvent::TradeFill { client_order_id, fill_qty, price, fee } => {
                    let Some((symbol, side)) = sink_order_symbols.lock().unwrap().get(&client_order_id).cloned()
                    else {
                        return;
                    };
                    let ts_ms = (sink_clock)();
                    let fill = Fill::new(symbol, side, fill_qty, price.unwrap_or(0), fee.unwrap_or(0), ts_ms, client_order_id);
                    let agg = oms_aggregator.clone();
                    let risk = oms_risk.clone();
                    tokio::spawn(async move {
                        let mut agg = agg.lock().await;
                        if let Ok(Some(rt)) = agg.on_fill(&fill) {
                            risk.update_daily_pnl(rt.net_pnl_micros);
                        }
                    });
                }
                _ => {}
            }
        });
        let oms = Arc::new(oms);
        oms.reconcile_inflight_open_orders(&symbols).await?;

        let strategy_cfg = config::strategy_config_from_json(&opts.config_json, symbols.clone());
        let strategy_gateway = gateway_for_execution.clone();
        let strategy = Arc::new(FundingBasisStrategy::new(strategy_gateway, oms.clone(), risk.clone(), strategy_cfg));
        strategy.bind_to_risk(&risk);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            gateway_for_execution,
            data_source,
            live,
            paper,
            oms,
            risk,
            strategy,
            aggregator,
            symbols,
            mode: opts.mode,
            clock,
            audit,
            run_id: opts.provenance.run_id,
            cfg: opts.config_json,
            venue_api_secret,
            flatten_on_exit: opts.flatten_on_exit,
            flatten_drain_timeout: opts.flatten_drain_timeout,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Runs every task concurrently until `shutdown()` is called (or the
    /// process receives ctrl-c, handled by the caller), then — if configured
    /// — drains inflight orders and flattens all open positions.
    pub async fn run(self, daemon_state: Option<Arc<fbt_daemon::state::AppState>>) -> anyhow::Result<()> {
        let mut set = tokio::task::JoinSet::new();

        {
            let live = self.live.clone();
            let paper = self.paper.clone();
            let url = config::public_ws_url(&self.cfg);
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                ws::run_public_consumer(
                    url,
                    move |tick| {
                        live.update_bbo(&tick.symbol, tick.bid, tick.ask, tick.ts_ms);
                        if let Some(last) = tick.last {
                            live.update_last_trade(&tick.symbol, last);
                        }
                        if let Some(paper) = &paper {
                            paper.update_bbo(&tick.symbol, tick.bid, tick.ask, tick.ts_ms);
                            if let Some(last) = tick.last {
                                paper.update_last_trade(&tick.symbol, last);
                            }
                        }
                    },
                    shutdown,
                )
                .await;
            });
        }

        if matches!(self.mode, RunMode::Live) {
            let url = config::private_ws_url(&self.cfg);
            let api_secret = self.venue_api_secret.clone();
            let oms_for_events = self.oms.clone();
            let oms_for_reconnect = self.oms.clone();
            let risk = self.risk.clone();
            let clock = self.clock.clone();
            let reconnect_symbols = self.symbols.clone();
            let ping_interval_ms = config::ws_ping_interval_ms(&self.cfg);
            let idle_timeout_ms = config::ws_idle_timeout_ms(&self.cfg);
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                ws::run_private_consumer(
                    url,
                    api_secret,
                    clock,
                    ping_interval_ms,
                    idle_timeout_ms,
                    move |ev| {
                        let oms = oms_for_events.clone();
                        tokio::spawn(async move {
                            let _ = oms.on_execution_event(ev).await;
                        });
                    },
                    move |duration_ms| risk.record_ws_disconnect(duration_ms),
                    move || {
                        let oms = oms_for_reconnect.clone();
                        let symbols = reconnect_symbols.clone();
                        tokio::spawn(async move {
                            if let Err(e) = oms.reconcile_inflight_open_orders(&symbols).await {
                                tracing::warn!(error = %e, "reconcile after private ws reconnect failed");
                            }
                        });
                    },
                    shutdown,
                )
                .await;
            });
        }

        {
            let strategy = self.strategy.clone();
            let primary = self.gateway_for_execution.clone();
            let funding_source = self.data_source.clone();
            let symbols = self.symbols.clone();
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                tasks::strategy_loop(strategy, primary, funding_source, symbols, Duration::from_secs(3), shutdown)
                    .await;
            });
        }

        {
            let oms = self.oms.clone();
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                tasks::oms_timeout_scanner(oms, Duration::from_secs(5), shutdown).await;
            });
        }

        {
            let oms = self.oms.clone();
            let symbols = self.symbols.clone();
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                tasks::chase_scanner(oms, symbols, Duration::from_secs(2), shutdown).await;
            });
        }

        {
            let risk = self.risk.clone();
            let aggregator = self.aggregator.clone();
            let symbols = self.symbols.clone();
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                let rows_fn = move || -> Vec<OpsCheckRow> { Vec::new() };
                tasks::metrics_heartbeat(risk, daemon_state, rows_fn, Duration::from_secs(30), shutdown).await;
                let _ = (aggregator, symbols);
            });
        }

        {
            let aggregator = self.aggregator.clone();
            let symbols = self.symbols.clone();
            let shutdown = self.shutdown_rx.clone();
            set.spawn(async move {
                tasks::daily_report_scheduler(aggregator, symbols, Duration::from_secs(24 * 3_600), shutdown).await;
            });
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
            _ = async {
                while (set.join_next().await).is_some() {}
            } => {}
        }

        self.shutdown_tx.send_replace(true);

        if self.flatten_on_exit {
            tracing::info!("flatten_on_exit: draining inflight orders");
            let _ = tokio::time::timeout(self.flatten_drain_timeout, drain_inflight(&self.oms)).await;
            self.strategy.flatten_all().await;
        }

        while set.join_next().await.is_some() {}

        if let Ok(mut w) = self.audit.lock() {
            let _ = w.append(self.run_id, "runtime", "run_stopped", serde_json::json!({}));
        }

        Ok(())
    }
}

async fn drain_inflight(oms: &Oms) {
    for _ in 0..10 {
        if let Err(e) = oms.process_timeouts().await {
            tracing::warn!(error = %e, "drain: process_timeouts failed");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn bootstrap_instruments(
    data_source: &dyn Gateway,
    symbols: &[String],
) -> FbtResult<HashMap<String, InstrumentMeta>> {
    let mut map = HashMap::new();
    for symbol in symbols {
        let perp = data_source.get_instrument_meta(symbol).await?;
        map.insert(symbol.clone(), perp);
        let spot_symbol = format!("{symbol}_SPOT");
        let spot = data_source.get_instrument_meta(&spot_symbol).await.unwrap_or(perp);
        map.insert(spot_symbol, spot);
    }
    Ok(map)
}

fn spawn_execution_drain(_paper: Arc<PaperGateway>, mut rx: tokio::sync::mpsc::UnboundedReceiver<fbt_core::ExecutionEvent>) {
    // The Paper Exchange synthesizes fills synchronously inside place_order;
    // `Oms::on_execution_event` is fed directly by the caller that awaits
    // `place_order`/`amend_order`, so this channel only needs to be drained
    // to avoid unbounded buildup if a caller never polls it.
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
}

fn audit_event_type(ev: &OmsAuditEvent) -> &'static str {
    match ev {
        OmsAuditEvent::OrderNew { .. } => "order_new",
        OmsAuditEvent::OrderCanceled { .. } => "order_canceled",
        OmsAuditEvent::OrderRejected { .. } => "order_rejected",
        OmsAuditEvent::TradeFill { .. } => "trade_fill",
    }
}

fn audit_event_json(ev: &OmsAuditEvent) -> Value {
    match ev {
        OmsAuditEvent::OrderNew { client_order_id, symbol, side, r#type, qty, price } => serde_json::json!({
            "client_order_id": client_order_id,
            "symbol": symbol,
            "side": format!("{side:?}"),
            "type": format!("{type:?}"),
            "qty": qty,
            "price": price,
        }),
        OmsAuditEvent::OrderCanceled { client_order_id } => serde_json::json!({ "client_order_id": client_order_id }),
        OmsAuditEvent::OrderRejected { client_order_id, reason } => serde_json::json!({
            "client_order_id": client_order_id,
            "reason": reason,
        }),
        OmsAuditEvent::TradeFill { client_order_id, fill_qty, price, fee } => serde_json::json!({
            "client_order_id": client_order_id,
            "fill_qty": fill_qty,
            "price": price,
            "fee": fee,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_as_str_matches_config_mode_naming() {
        assert_eq!(RunMode::Paper.as_str(), "PAPER");
        assert_eq!(RunMode::Live.as_str(), "LIVE");
    }
}
