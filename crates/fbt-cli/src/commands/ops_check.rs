//! `fbt ops-check`: a read-only per-symbol operability snapshot against the
//! live venue, without placing any orders.
//!
//! Row field shape lives in `fbt_core::OpsCheckRow`.

use anyhow::{Context, Result};
use fbt_core::{bbo_valid, Gateway, OpsCheckRow};
use fbt_gateway_live::LiveGateway;

pub async fn run_ops_check(
    config_paths: Vec<String>,
    out_csv: Option<String>,
    out_json: Option<String>,
) -> Result<()> {
    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = fbt_config::load_layered_yaml(&path_refs)?;

    let mode = loaded.config_json.pointer("/runtime/mode").and_then(|v| v.as_str()).unwrap_or("PAPER").to_string();
    let secrets = fbt_config::resolve_secrets_for_mode(&loaded.config_json, &mode)?;

    let symbols = fbt_runtime::config::symbols_from_config(&loaded.config_json);
    if symbols.is_empty() {
        anyhow::bail!("config must set /symbols to at least one perp symbol for ops-check");
    }

    let live_cfg = fbt_runtime::config::live_gateway_config_from_json(
        &loaded.config_json,
        secrets.venue_api_key.clone().unwrap_or_default(),
        secrets.venue_api_secret.clone().unwrap_or_default(),
    );
    let price_scale_ready_required = live_cfg.price_scale_ready_required;
    let clock = fbt_core::system_clock();
    let gateway = LiveGateway::new(live_cfg, clock);

    let (auth_ok, auth_reason) = gateway.auth_preflight().await;

    let mut rows = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        rows.push(build_row(&gateway, symbol, auth_ok, &auth_reason, price_scale_ready_required).await);
    }

    if let Some(path) = &out_csv {
        write_csv(path, &rows)?;
        println!("ops_check_csv={path}");
    }
    if let Some(path) = &out_json {
        let json = serde_json::to_string_pretty(&rows).context("serialize ops-check rows")?;
        std::fs::write(path, json).with_context(|| format!("write ops-check json: {path}"))?;
        println!("ops_check_json={path}");
    }
    if out_csv.is_none() && out_json.is_none() {
        for row in &rows {
            println!(
                "{} md_ready={} bbo_valid={} auth={} open_orders={} decision={}",
                row.symbol, row.md_ready, row.bbo_valid, row.auth, row.open_orders, row.decision
            );
        }
    }

    Ok(())
}

async fn build_row(
    gateway: &LiveGateway,
    symbol: &str,
    auth_ok: bool,
    auth_reason: &str,
    price_scale_ready_required: u32,
) -> OpsCheckRow {
    let bbo = gateway.get_bbo(symbol).await.ok();
    let funding = gateway.get_funding_info(symbol).await.ok();
    let meta = gateway.get_instrument_meta(symbol).await.ok();
    let open_orders = gateway.get_open_orders(symbol).await.map(|v| v.len()).unwrap_or(0);

    let bbo_bid = bbo.and_then(|b| b.bid);
    let bbo_ask = bbo.and_then(|b| b.ask);
    let valid = bbo_valid(bbo_bid, bbo_ask);
    let scale_ready = gateway.is_price_scale_ready(symbol, price_scale_ready_required);

    let (md_ready, md_reason) = match (bbo, meta) {
        (Some(_), Some(_)) if valid => (true, "ok".to_string()),
        (Some(_), Some(_)) => (false, "bbo_invalid".to_string()),
        (None, _) => (false, "bbo_unavailable".to_string()),
        (_, None) => (false, "instrument_meta_unavailable".to_string()),
    };

    OpsCheckRow {
        symbol: symbol.to_string(),
        funding_predicted: funding.and_then(|f| f.predicted_rate_e6),
        next_funding_time: funding.and_then(|f| f.next_funding_time_ms),
        bbo_bid,
        bbo_ask,
        bbo_valid: valid,
        price_scale_ready: scale_ready,
        price_state: gateway.price_state(symbol).to_string(),
        md_ready,
        md_reason,
        cooldown_active: false,
        cooldown_left_ms: 0,
        qty_step_spot: meta.map(|m| m.qty_step_spot).unwrap_or(0),
        qty_step_perp: meta.map(|m| m.qty_step_perp).unwrap_or(0),
        qty_common_step: meta.map(|m| fbt_core::lcm(m.qty_step_spot, m.qty_step_perp)).unwrap_or(0),
        min_qty_spot: meta.map(|m| m.min_qty_spot).unwrap_or(0),
        min_qty_perp: meta.map(|m| m.min_qty_perp).unwrap_or(0),
        min_notional_spot: meta.map(|m| m.min_notional_spot).unwrap_or(0),
        min_notional_perp: meta.map(|m| m.min_notional_perp).unwrap_or(0),
        auth: auth_ok,
        open_orders,
        decision: "NONE".to_string(),
        predicted_apr: None,
        reason: if auth_ok { "ops_check".to_string() } else { auth_reason.to_string() },
    }
}

fn write_csv(path: &str, rows: &[OpsCheckRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("open ops-check csv: {path}"))?;
    for row in rows {
        writer.serialize(row).context("write ops-check row")?;
    }
    writer.flush().context("flush ops-check csv")?;
    Ok(())
}
