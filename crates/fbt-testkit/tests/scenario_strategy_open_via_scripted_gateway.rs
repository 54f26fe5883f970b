//! A funding-favourable prediction drives the strategy to open a hedged
//! position through a scripted venue — the open leg of seed scenario 3
//! (open/hedge/close), exercised here against the real `FundingBasisStrategy`
//! and `Oms` rather than re-describing it as a bare unit assertion.

use std::sync::Arc;

use fbt_oms::{Oms, OmsConfig};
use fbt_risk::{RiskConfig, RiskManager};
use fbt_strategy::{FundingBasisStrategy, StrategyConfig};
use fbt_testkit::{manual_clock, FundingInfoFixture, ScriptedGateway};

#[tokio::test]
async fn favourable_funding_prediction_opens_both_legs() {
    let (clock, _handle) = manual_clock(0);
    let gateway = Arc::new(ScriptedGateway::new());
    let oms = Arc::new(Oms::new(gateway.clone(), clock, OmsConfig::conservative_defaults()));
    let risk = Arc::new(RiskManager::new(RiskConfig::conservative_defaults()));

    let mut cfg = StrategyConfig::conservative_defaults(vec!["BTCUSDT".to_string()]);
    cfg.min_expected_apr_e6 = 0;
    cfg.max_total_notional_micros = 1_000 * fbt_core::MICROS_PER_UNIT;
    cfg.max_symbol_notional_micros = 1_000 * fbt_core::MICROS_PER_UNIT;
    let strategy = Arc::new(FundingBasisStrategy::new(gateway.clone(), oms, risk.clone(), cfg));
    strategy.bind_to_risk(&risk);

    let funding = FundingInfoFixture::new().predicted_rate_e6(600).build();
    let decision = strategy.evaluate("BTCUSDT", &funding, 100_000_000, 100_000_000);
    strategy.execute(&decision).await.unwrap();

    let placed = gateway.placed();
    assert_eq!(placed.len(), 2, "expected a perp leg and a spot leg");
    assert_eq!(placed[0].qty, placed[1].qty, "legs must share identical quantised qty");
}
