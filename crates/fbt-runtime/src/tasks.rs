//! The Runner's periodic task bodies: strategy loop, OMS timeout
//! scanner, PostOnly chase scanner, metrics heartbeat, daily-report
//! scheduler. Each is a plain async function taking a `shutdown` watch so
//! `Runner::run` can spawn and join them uniformly.
//!
//! The strategy loop: per symbol, fetch funding from the data source,
//! resolve perp/spot price with `mid(bbo) > last > REST fallback`
//! priority, then `strategy.evaluate`/`execute`. Errors are logged and the
//! loop continues per iteration rather than letting one bad symbol kill
//! the whole loop.

use std::sync::Arc;
use std::time::Duration;

use fbt_core::{bbo_valid, Gateway, OpsCheckRow};
use fbt_oms::Oms;
use fbt_portfolio::RoundTripAggregator;
use fbt_risk::RiskManager;
use fbt_strategy::FundingBasisStrategy;
use tokio::sync::{watch, Mutex};

/// `mid(bbo) > last_trade > data_source REST` ticker resolution, matching
/// `PaperExchange.get_ticker`'s fallback order.
async fn resolve_ticker(primary: &dyn Gateway, fallback: &dyn Gateway, symbol: &str) -> Option<i64> {
    if let Ok(bbo) = primary.get_bbo(symbol).await {
        if bbo_valid(bbo.bid, bbo.ask) {
            let (b, a) = (bbo.bid.unwrap(), bbo.ask.unwrap());
            return Some((b + a) / 2);
        }
    }
    fallback.get_bbo(symbol).await.ok().and_then(|bbo| match (bbo.bid, bbo.ask) {
        (Some(b), Some(a)) if bbo_valid(Some(b), Some(a)) => Some((b + a) / 2),
        _ => None,
    })
}

/// Every `period`, evaluates and executes the strategy for each configured
/// symbol. `primary`/`funding_source` are the same gateway in live mode and
/// the `(PaperGateway, LiveGateway data source)` pair in paper mode.
pub async fn strategy_loop(
    strategy: Arc<FundingBasisStrategy>,
    primary: Arc<dyn Gateway>,
    funding_source: Arc<dyn Gateway>,
    symbols: Vec<String>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        for symbol in &symbols {
            let funding = match funding_source.get_funding_info(symbol).await {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "strategy loop: funding fetch failed");
                    continue;
                }
            };
            let spot_symbol = format!("{symbol}_SPOT");
            let perp_price = resolve_ticker(primary.as_ref(), funding_source.as_ref(), symbol).await;
            let spot_price = resolve_ticker(primary.as_ref(), funding_source.as_ref(), &spot_symbol).await;
            let (Some(perp_price), Some(spot_price)) = (perp_price, spot_price) else {
                tracing::warn!(symbol, "strategy loop: no valid bbo yet, skipping");
                continue;
            };

            let decision = strategy.evaluate(symbol, &funding, spot_price, perp_price);
            if let Err(e) = strategy.execute(&decision).await {
                tracing::error!(symbol, error = %e, "strategy step error");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// OMS timeout scanner (`process_timeouts`): cancels stale non-terminal
/// orders and resends the unfilled remainder.
pub async fn oms_timeout_scanner(oms: Arc<Oms>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if let Err(e) = oms.process_timeouts().await {
            tracing::error!(error = %e, "oms timeout scan failed");
        }
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

/// PostOnly chase scanner (`maintain_postonly_orders`).
pub async fn chase_scanner(
    oms: Arc<Oms>,
    symbols: Vec<String>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if let Err(e) = oms.maintain_postonly_orders(&symbols).await {
            tracing::error!(error = %e, "postonly chase scan failed");
        }
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

/// Metrics heartbeat (~30s): logs risk-manager state and, when the daemon
/// surface is embedded, republishes an ops-check snapshot onto its bus.
pub async fn metrics_heartbeat(
    risk: Arc<RiskManager>,
    daemon_status: Option<Arc<fbt_daemon::state::AppState>>,
    rows_fn: impl Fn() -> Vec<OpsCheckRow> + Send + Sync + 'static,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let killed = risk.is_killed();
        let allowed = risk.new_orders_allowed();
        tracing::info!(killed, new_orders_allowed = allowed, "risk heartbeat");

        if let Some(state) = &daemon_status {
            let rows = rows_fn();
            let mut snap = state.status.write().await;
            snap.rows = rows;
            snap.state = if killed { "killed".to_string() } else { "running".to_string() };
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
    }
}

/// Daily-report scheduler: every `period` (nominally 24h), snapshots the
/// round-trip aggregator's realised PnL and logs a summary line.
pub async fn daily_report_scheduler(
    aggregator: Arc<Mutex<RoundTripAggregator>>,
    symbols: Vec<String>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
        }
        if *shutdown.borrow() {
            return;
        }
        let agg = aggregator.lock().await;
        for symbol in &symbols {
            let open_qty = agg.open_position_signed_qty(symbol);
            let open_avg = agg.open_avg_px_micros(symbol);
            tracing::info!(symbol, open_qty, open_avg_px_micros = open_avg, "daily report: open position");
        }
    }
}
