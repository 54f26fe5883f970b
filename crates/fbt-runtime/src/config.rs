//! Translates the merged config JSON (`fbt_config::LoadedConfig`)
//! into the typed configs each component constructor wants.
//!
//! Only the subtrees `fbt_config::consumption` already registers as
//! consumed (`/symbols`, `/strategy`, `/risk`, `/gateway`, `/daemon`,
//! `/allow_live`) are read here; OMS tunables have no config surface and
//! always take `OmsConfig::conservative_defaults()` — the same choice the
//! schema in `fbt-config` already makes by never reserving an `/oms`
//! pointer.

use fbt_gateway_live::LiveGatewayConfig;
use fbt_oms::OmsConfig;
use fbt_risk::RiskConfig;
use fbt_strategy::StrategyConfig;
use serde_json::Value;

fn i64_at(cfg: &Value, pointer: &str, default: i64) -> i64 {
    cfg.pointer(pointer).and_then(Value::as_i64).unwrap_or(default)
}

fn u32_at(cfg: &Value, pointer: &str, default: u32) -> u32 {
    cfg.pointer(pointer).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(default)
}

fn u64_at(cfg: &Value, pointer: &str, default: u64) -> u64 {
    cfg.pointer(pointer).and_then(Value::as_u64).unwrap_or(default)
}

fn str_at<'a>(cfg: &'a Value, pointer: &str, default: &'a str) -> String {
    cfg.pointer(pointer).and_then(Value::as_str).unwrap_or(default).to_string()
}

/// `/symbols`: a flat list of perp symbols this run trades. The spot leg of
/// each is always `{symbol}_SPOT` (convention).
pub fn symbols_from_config(cfg: &Value) -> Vec<String> {
    cfg.pointer("/symbols")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

pub fn strategy_config_from_json(cfg: &Value, symbols: Vec<String>) -> StrategyConfig {
    let mut sc = StrategyConfig::conservative_defaults(symbols);
    sc.period_seconds = i64_at(cfg, "/strategy/period_seconds", sc.period_seconds);
    sc.min_hold_periods = i64_at(cfg, "/strategy/min_hold_periods", sc.min_hold_periods);
    sc.rebalance_band_bps = i64_at(cfg, "/strategy/rebalance_band_bps", sc.rebalance_band_bps);
    sc.min_expected_apr_e6 = i64_at(cfg, "/strategy/min_expected_apr_e6", sc.min_expected_apr_e6);
    sc.taker_bps_roundtrip = i64_at(cfg, "/strategy/taker_bps_roundtrip", sc.taker_bps_roundtrip);
    sc.estimated_slippage_bps = i64_at(cfg, "/strategy/estimated_slippage_bps", sc.estimated_slippage_bps);
    sc.max_total_notional_micros = i64_at(cfg, "/strategy/max_total_notional_micros", sc.max_total_notional_micros);
    sc.max_symbol_notional_micros = i64_at(cfg, "/strategy/max_symbol_notional_micros", sc.max_symbol_notional_micros);
    sc
}

pub fn risk_config_from_json(cfg: &Value) -> RiskConfig {
    let mut rc = RiskConfig::conservative_defaults();
    rc.daily_loss_cut_micros = i64_at(cfg, "/risk/daily_loss_cut_micros", rc.daily_loss_cut_micros);
    rc.ws_disconnect_threshold_ms = i64_at(cfg, "/risk/ws_disconnect_threshold_ms", rc.ws_disconnect_threshold_ms);
    rc.hedge_latency_p95_threshold_ms =
        i64_at(cfg, "/risk/hedge_latency_p95_threshold_ms", rc.hedge_latency_p95_threshold_ms);
    rc.api_error_max_in_60s = u32_at(cfg, "/risk/api_error_max_in_60s", rc.api_error_max_in_60s);
    rc.funding_flip_min_abs_e6 = i64_at(cfg, "/risk/funding_flip_min_abs_e6", rc.funding_flip_min_abs_e6);
    rc.funding_flip_consecutive = u32_at(cfg, "/risk/funding_flip_consecutive", rc.funding_flip_consecutive);
    rc
}

pub fn oms_config_from_json(_cfg: &Value) -> OmsConfig {
    OmsConfig::conservative_defaults()
}

/// Venue base URL and REST/circuit-breaker tunables come from `/gateway`;
/// API key/secret never live in YAML — callers resolve those via
/// `fbt_config::resolve_secrets_for_mode` against the process environment.
pub fn live_gateway_config_from_json(cfg: &Value, api_key: String, api_secret: String) -> LiveGatewayConfig {
    LiveGatewayConfig {
        base_url: str_at(cfg, "/gateway/base_url", "https://example-venue.invalid"),
        api_key,
        api_secret,
        rest_max_concurrency: u64_at(cfg, "/gateway/rest_max_concurrency", 8) as usize,
        cb_fail_threshold: u32_at(cfg, "/gateway/cb_fail_threshold", 5),
        cb_open_seconds: i64_at(cfg, "/gateway/cb_open_seconds", 30),
        instrument_ttl_ms: i64_at(cfg, "/gateway/instrument_ttl_ms", 60_000),
        request_timeout_ms: u64_at(cfg, "/gateway/request_timeout_ms", 5_000),
        bbo_max_age_ms: bbo_max_age_ms(cfg),
        price_dev_bps_limit: cfg.pointer("/gateway/price_dev_bps_limit").and_then(Value::as_i64),
        price_scale_ready_required: u32_at(cfg, "/gateway/price_scale_ready_required", 2),
        price_scale_max_wait_ms: i64_at(cfg, "/gateway/price_scale_max_wait_ms", 30_000),
    }
}

pub fn public_ws_url(cfg: &Value) -> String {
    str_at(cfg, "/gateway/public_ws_url", "wss://example-venue.invalid/public")
}

pub fn private_ws_url(cfg: &Value) -> String {
    str_at(cfg, "/gateway/private_ws_url", "wss://example-venue.invalid/private")
}

pub fn bbo_max_age_ms(cfg: &Value) -> i64 {
    i64_at(cfg, "/gateway/bbo_max_age_ms", 5_000)
}

/// Interval between proactive keepalive pings on the private WS connection.
pub fn ws_ping_interval_ms(cfg: &Value) -> i64 {
    i64_at(cfg, "/gateway/ws_ping_interval_ms", 20_000)
}

/// Maximum gap since the last received frame before the private WS consumer
/// treats the connection as dead and reconnects.
pub fn ws_idle_timeout_ms(cfg: &Value) -> i64 {
    i64_at(cfg, "/gateway/ws_idle_timeout_ms", 45_000)
}

pub fn daemon_serve_enabled(cfg: &Value) -> bool {
    cfg.pointer("/daemon/serve").and_then(Value::as_bool).unwrap_or(false)
}

pub fn daemon_addr(cfg: &Value) -> String {
    str_at(cfg, "/daemon/addr", "127.0.0.1:8899")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategy_config_reads_overrides_and_falls_back_to_defaults() {
        let cfg = json!({
            "strategy": {
                "period_seconds": 3600,
                "min_expected_apr_e6": 50_000,
            }
        });
        let sc = strategy_config_from_json(&cfg, vec!["BTCUSDT".to_string()]);
        assert_eq!(sc.period_seconds, 3600);
        assert_eq!(sc.min_expected_apr_e6, 50_000);
        assert_eq!(sc.rebalance_band_bps, StrategyConfig::conservative_defaults(vec![]).rebalance_band_bps);
    }

    #[test]
    fn symbols_from_config_reads_flat_array() {
        let cfg = json!({ "symbols": ["BTCUSDT", "ETHUSDT"] });
        assert_eq!(symbols_from_config(&cfg), vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
    }

    #[test]
    fn missing_symbols_yields_empty_vec() {
        let cfg = json!({});
        assert!(symbols_from_config(&cfg).is_empty());
    }
}
