use std::collections::HashMap;

use fbt_backtest::{BacktestConfig, BacktestEngine, FundingEvent, Tick};
use fbt_core::{InstrumentMeta, MICROS_PER_UNIT};
use fbt_oms::OmsConfig;
use fbt_risk::RiskConfig;
use fbt_strategy::StrategyConfig;

fn instruments() -> HashMap<String, InstrumentMeta> {
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
    let mut m = HashMap::new();
    m.insert("BTCUSDT".to_string(), meta);
    m.insert("BTCUSDT_SPOT".to_string(), meta);
    m
}

fn strategy_cfg() -> StrategyConfig {
    StrategyConfig {
        max_total_notional_micros: 1_000_000 * MICROS_PER_UNIT,
        max_symbol_notional_micros: 1_000_000 * MICROS_PER_UNIT,
        ..StrategyConfig::conservative_defaults(vec!["BTCUSDT".to_string()])
    }
}

fn make_engine() -> BacktestEngine {
    BacktestEngine::new(
        instruments(),
        strategy_cfg(),
        RiskConfig::conservative_defaults(),
        OmsConfig::conservative_defaults(),
        BacktestConfig::test_defaults(),
    )
}

/// A flat 100-unit book for both legs, positive funding throughout.
fn make_ticks(n: i64) -> Vec<Tick> {
    let mut out = Vec::new();
    for i in 0..n {
        let ts_ms = 1_700_000_000_000 + i * 1_000;
        out.push(Tick::new(ts_ms, "BTCUSDT", 99 * MICROS_PER_UNIT, 101 * MICROS_PER_UNIT, 100 * MICROS_PER_UNIT));
        out.push(Tick::new(ts_ms, "BTCUSDT_SPOT", 99 * MICROS_PER_UNIT, 101 * MICROS_PER_UNIT, 100 * MICROS_PER_UNIT));
    }
    out
}

#[tokio::test]
async fn replay_is_deterministic_across_runs() {
    let ticks = make_ticks(5);
    let funding = vec![FundingEvent::new(1_700_000_002_500, "BTCUSDT", 5_000)];

    let mut e1 = make_engine();
    let r1 = e1.run(ticks.clone(), funding.clone()).await.unwrap();

    let mut e2 = make_engine();
    let r2 = e2.run(ticks, funding).await.unwrap();

    assert_eq!(r1, r2);
    assert!(!r1.round_trips.is_empty(), "expected at least one completed round trip");
}

#[tokio::test]
async fn sustained_positive_funding_opens_and_flattens_at_end() {
    let ticks = make_ticks(3);
    let mut engine = make_engine();
    let report = engine.run(ticks, vec![]).await.unwrap();

    // no funding event applied this run, but the open-then-flatten-at-end
    // path must still produce a matched round trip for both legs.
    assert_eq!(report.round_trips.len(), 2, "perp + spot legs each close out their own round trip");
    assert!(engine.order_symbols_seen() >= 2);
}

#[tokio::test]
async fn funding_settlement_sign_matches_position_direction() {
    let ticks = make_ticks(2);
    let funding = vec![FundingEvent::new(1_700_000_000_500, "BTCUSDT", 5_000)];
    let mut engine = make_engine();
    let report = engine.run(ticks, funding).await.unwrap();

    // No position was open yet at the funding timestamp (first strategy
    // evaluation happens on tick 0, funding fires mid-way through tick 0->1),
    // so funding_events_applied counts the event even when it nets to zero.
    assert_eq!(report.funding_events_applied, 1);
}

#[tokio::test]
async fn no_funding_and_no_signal_yields_flat_report() {
    let mut instruments_map = instruments();
    instruments_map.insert("ETHUSDT".to_string(), *instruments_map.get("BTCUSDT").unwrap());
    instruments_map.insert("ETHUSDT_SPOT".to_string(), *instruments_map.get("BTCUSDT").unwrap());

    let cfg = StrategyConfig {
        max_total_notional_micros: 1_000_000 * MICROS_PER_UNIT,
        max_symbol_notional_micros: 1_000_000 * MICROS_PER_UNIT,
        ..StrategyConfig::conservative_defaults(vec!["ETHUSDT".to_string()])
    };
    let mut engine = BacktestEngine::new(
        instruments_map,
        cfg,
        RiskConfig::conservative_defaults(),
        OmsConfig::conservative_defaults(),
        BacktestConfig::test_defaults(),
    );

    // Ticks only cover BTCUSDT; ETHUSDT never gets a funding prediction so
    // the strategy can never open.
    let report = engine.run(make_ticks(3), vec![]).await.unwrap();
    assert!(report.round_trips.is_empty());
    assert_eq!(report.net_pnl_micros, 0);
}
