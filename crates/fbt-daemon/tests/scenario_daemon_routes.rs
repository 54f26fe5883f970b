use std::sync::Arc;

use fbt_core::OpsCheckRow;
use fbt_daemon::{
    routes::build_router,
    state::{AppState, StatusSnapshot},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

fn row(symbol: &str) -> OpsCheckRow {
    OpsCheckRow {
        symbol: symbol.to_string(),
        funding_predicted: Some(5_000),
        next_funding_time: Some(1_700_000_000_000),
        bbo_bid: Some(99_000_000),
        bbo_ask: Some(101_000_000),
        bbo_valid: true,
        price_scale_ready: true,
        price_state: "READY".to_string(),
        md_ready: true,
        md_reason: "OK".to_string(),
        cooldown_active: false,
        cooldown_left_ms: 0,
        qty_step_spot: 1_000,
        qty_step_perp: 1_000,
        qty_common_step: 1_000,
        min_qty_spot: 1_000,
        min_qty_perp: 1_000,
        min_notional_spot: 0,
        min_notional_perp: 0,
        auth: true,
        open_orders: 0,
        decision: "open".to_string(),
        predicted_apr: Some(5_475_000),
        reason: "sufficient funding".to_string(),
    }
}

#[tokio::test]
async fn health_reports_build_info() {
    let state = Arc::new(AppState::new());
    let app = build_router(state);

    let res = app
        .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), axum::http::StatusCode::OK);

    let body = res.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "fbt-daemon");
}

#[tokio::test]
async fn status_reflects_runner_published_snapshot() {
    let state = Arc::new(AppState::new());
    {
        let mut s = state.status.write().await;
        *s = StatusSnapshot { state: "running".to_string(), run_id: Some("abc".to_string()), rows: vec![row("BTCUSDT")], ..Default::default() };
    }
    let app = build_router(state);

    let res = app
        .oneshot(axum::http::Request::builder().uri("/status").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), axum::http::StatusCode::OK);

    let body = res.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "running");
    assert_eq!(json["rows"][0]["symbol"], "BTCUSDT");
    assert_eq!(json["rows"][0]["decision"], "open");
}

#[tokio::test]
async fn status_starts_idle_with_no_rows() {
    let state = Arc::new(AppState::new());
    let app = build_router(state);

    let res = app
        .oneshot(axum::http::Request::builder().uri("/status").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "idle");
    assert_eq!(json["rows"].as_array().unwrap().len(), 0);
}
