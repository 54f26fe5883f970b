//! `fbt backtest`: replay a tick/funding CSV pair through the backtest
//! engine and print (or write) the resulting PnL report.

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use fbt_backtest::{BacktestConfig, BacktestEngine, FundingEvent, Tick};
use fbt_core::{InstrumentMeta, MICROS_PER_UNIT};
use fbt_oms::OmsConfig;
use fbt_risk::RiskConfig;
use fbt_strategy::StrategyConfig;

pub struct BacktestArgs {
    pub ticks: String,
    pub funding: Option<String>,
    pub config_paths: Vec<String>,
    pub step_sec: i64,
    pub out_json: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct TickRow {
    ts_ms: i64,
    symbol: String,
    bid_micros: i64,
    ask_micros: i64,
    last_micros: i64,
}

#[derive(Debug, serde::Deserialize)]
struct FundingRow {
    ts_ms: i64,
    symbol: String,
    rate_e6: i64,
}

fn load_ticks(path: &str) -> Result<Vec<Tick>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("open ticks csv: {path}"))?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        let row: TickRow = row.with_context(|| format!("parse tick row in {path}"))?;
        out.push(Tick::new(row.ts_ms, row.symbol, row.bid_micros, row.ask_micros, row.last_micros));
    }
    Ok(out)
}

fn load_funding(path: &str) -> Result<Vec<FundingEvent>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("open funding csv: {path}"))?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        let row: FundingRow = row.with_context(|| format!("parse funding row in {path}"))?;
        out.push(FundingEvent::new(row.ts_ms, row.symbol, row.rate_e6));
    }
    Ok(out)
}

/// Conservative placeholder instrument metadata for every symbol the ticks
/// reference — a backtest replay has no venue to query, so every symbol
/// gets the same tick/step sizing (mirrors the fixture used by
/// `fbt-backtest`'s own determinism scenario test).
fn instruments_for(symbols: impl Iterator<Item = String>) -> HashMap<String, InstrumentMeta> {
    let meta = InstrumentMeta {
        price_scale: 2,
        tick_size: 1_000,
        qty_step_perp: 1_000,
        qty_step_spot: 1_000,
        min_qty_perp: 1_000,
        min_qty_spot: 1_000,
        min_notional_perp: 0,
        min_notional_spot: 0,
        multiplier: MICROS_PER_UNIT,
    };
    symbols.map(|s| (s, meta)).collect()
}

pub async fn run_backtest(args: BacktestArgs) -> Result<()> {
    let path_refs: Vec<&str> = args.config_paths.iter().map(String::as_str).collect();
    let loaded = fbt_config::load_layered_yaml(&path_refs)?;

    let symbols = fbt_runtime::config::symbols_from_config(&loaded.config_json);
    if symbols.is_empty() {
        anyhow::bail!("config must set /symbols to at least one perp symbol for backtest replay");
    }

    let ticks = load_ticks(&args.ticks)?;
    let funding = match &args.funding {
        Some(p) => load_funding(p)?,
        None => Vec::new(),
    };

    let mut all_symbols: Vec<String> = symbols.clone();
    all_symbols.extend(symbols.iter().map(|s| format!("{s}_SPOT")));
    let instruments = instruments_for(all_symbols.into_iter());

    let strategy_cfg: StrategyConfig = fbt_runtime::config::strategy_config_from_json(&loaded.config_json, symbols);
    let risk_cfg: RiskConfig = fbt_runtime::config::risk_config_from_json(&loaded.config_json);
    let oms_cfg: OmsConfig = fbt_runtime::config::oms_config_from_json(&loaded.config_json);

    let mut bt_cfg = BacktestConfig::conservative_defaults();
    bt_cfg.step_sec = args.step_sec;

    let mut engine = BacktestEngine::new(instruments, strategy_cfg, risk_cfg, oms_cfg, bt_cfg);
    let report = engine.run(ticks, funding).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;

    println!("backtest_ok=true");
    println!("config_hash={}", loaded.config_hash);
    println!("round_trips={}", report.round_trips.len());
    println!("funding_events_applied={}", report.funding_events_applied);
    println!("funding_pnl_micros={}", report.funding_pnl_micros);
    println!("trading_pnl_micros={}", report.trading_pnl_micros);
    println!("fees_micros={}", report.fees_micros);
    println!("net_pnl_micros={}", report.net_pnl_micros);

    if let Some(out) = args.out_json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "config_hash": loaded.config_hash,
            "funding_pnl_micros": report.funding_pnl_micros,
            "trading_pnl_micros": report.trading_pnl_micros,
            "fees_micros": report.fees_micros,
            "net_pnl_micros": report.net_pnl_micros,
            "funding_events_applied": report.funding_events_applied,
            "round_trips": report.round_trips,
            "last_prices": report.last_prices,
        }))
        .context("serialize backtest report")?;
        fs::write(&out, json).with_context(|| format!("write report: {out}"))?;
        println!("report_path={out}");
    }

    Ok(())
}
