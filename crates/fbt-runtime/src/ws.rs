//! Public/private WS consumer loops.
//!
//! The Gateway crates only wire REST; wiring the WS consumer loops into
//! the Runner's task set is the Runner's job (see
//! `fbt_gateway_live::lib` doc comment). A ping/recv loop with
//! reconnect-on-drop, backed by `fbt_core::retry`'s exponential-jitter
//! backoff shape, reimplemented here against `tokio_tungstenite` since the
//! retry helper itself only wraps request/response calls, not a
//! long-lived socket.

use std::time::Duration;

use fbt_gateway_live::signing;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

const INITIAL_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Full-jitter exponential backoff for the `attempt`'th reconnect (0-based).
pub fn reconnect_backoff(attempt: u32) -> Duration {
    let exp = INITIAL_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16));
    let capped = exp.min(MAX_BACKOFF_MS);
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    Duration::from_millis(jittered)
}

/// One parsed public-market frame: a ticker-style BBO/last-trade update.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicTick {
    pub symbol: String,
    pub bid: Option<i64>,
    pub ask: Option<i64>,
    pub last: Option<i64>,
    pub ts_ms: i64,
}

fn parse_public_frame(text: &str) -> Option<PublicTick> {
    let wire: fbt_schemas::WireTicker = serde_json::from_str(text).ok()?;
    let to_micros = |s: &str| fbt_gateway_live::wire::decimal_string_to_micros(s).ok();
    Some(PublicTick {
        symbol: wire.symbol,
        bid: wire.bid.as_deref().and_then(to_micros),
        ask: wire.ask.as_deref().and_then(to_micros),
        last: wire.last.as_deref().and_then(to_micros),
        ts_ms: wire.ts_ms,
    })
}

/// Connects to `url`, reconnecting with exponential-jitter backoff whenever
/// the socket drops, until `shutdown` reports `true`. Every text frame that
/// parses as a [`WireTicker`] is handed to `on_tick`; frames that don't
/// parse are dropped (unrecognised/administrative frames).
pub async fn run_public_consumer(
    url: String,
    on_tick: impl Fn(PublicTick) + Send + Sync,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;
    loop {
        if *shutdown.borrow() {
            return;
        }
        match tokio_tungstenite::connect_async(&url).await {
            Ok((mut stream, _resp)) => {
                tracing::info!(url, "public ws connected");
                attempt = 0;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                let _ = stream.close(None).await;
                                return;
                            }
                        }
                        msg = stream.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if let Some(tick) = parse_public_frame(&text) {
                                        on_tick(tick);
                                    }
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    let _ = stream.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(url, error = %e, "public ws read error");
                                    break;
                                }
                                None => {
                                    tracing::warn!(url, "public ws closed by peer");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url, error = %e, attempt, "public ws connect failed");
            }
        }
        if *shutdown.borrow() {
            return;
        }
        tokio::time::sleep(reconnect_backoff(attempt)).await;
        attempt = attempt.saturating_add(1);
    }
}

/// Connects to the private `url`, authenticates with a signed `auth` frame
/// (`fbt_gateway_live::signing::sign_ws_auth`), subscribes to the
/// `orders`/`executions`/`positions` topics, then hands every parsed
/// [`fbt_core::ExecutionEvent`] to `on_event`. Runs a proactive ping every
/// `ping_interval_ms` and disconnects if no frame has arrived within
/// `idle_timeout_ms`, since a half-open TCP socket otherwise never surfaces
/// as a read error. `on_reconnect` fires once per successful
/// connect+auth+subscribe, before the recv loop starts, so callers can
/// re-reconcile inflight orders against whatever state they missed while
/// disconnected. Same backoff policy as [`run_public_consumer`]; callers
/// feed disconnect duration into `fbt_risk::RiskManager::record_ws_disconnect`.
#[allow(clippy::too_many_arguments)]
pub async fn run_private_consumer(
    url: String,
    api_secret: String,
    clock: fbt_core::MonoClock,
    ping_interval_ms: i64,
    idle_timeout_ms: i64,
    on_event: impl Fn(fbt_core::ExecutionEvent) + Send + Sync,
    on_disconnect: impl Fn(i64) + Send + Sync,
    on_reconnect: impl Fn() + Send + Sync,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;
    loop {
        if *shutdown.borrow() {
            return;
        }
        let connected_at = (clock)();
        match tokio_tungstenite::connect_async(&url).await {
            Ok((mut stream, _resp)) => {
                let expires_ms = (clock)() + 5_000;
                let (_payload, sig) = signing::sign_ws_auth(&api_secret, expires_ms);
                let auth_frame = serde_json::json!({ "op": "auth", "args": [expires_ms, sig] }).to_string();
                if stream.send(Message::Text(auth_frame)).await.is_err() {
                    tracing::warn!(url, "private ws auth send failed");
                } else {
                    let sub_frame =
                        serde_json::json!({ "op": "subscribe", "args": ["orders", "executions", "positions"] })
                            .to_string();
                    let _ = stream.send(Message::Text(sub_frame)).await;
                    tracing::info!(url, "private ws connected, authenticated and subscribed");
                    on_reconnect();
                }
                attempt = 0;

                let ping_period = Duration::from_millis(ping_interval_ms.max(1) as u64);
                let mut ping_tick = tokio::time::interval(ping_period);
                ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                let mut idle_check = tokio::time::interval(Duration::from_secs(1));
                idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                let mut last_frame_at = (clock)();

                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                let _ = stream.close(None).await;
                                return;
                            }
                        }
                        _ = ping_tick.tick() => {
                            if stream.send(Message::Ping(Vec::new())).await.is_err() {
                                tracing::warn!(url, "private ws ping send failed");
                                break;
                            }
                        }
                        _ = idle_check.tick() => {
                            if (clock)() - last_frame_at > idle_timeout_ms {
                                tracing::warn!(url, idle_timeout_ms, "private ws idle watchdog tripped");
                                break;
                            }
                        }
                        msg = stream.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    last_frame_at = (clock)();
                                    if let Ok(wire) = serde_json::from_str::<fbt_schemas::WireExecutionEvent>(&text) {
                                        if let Some(ev) = to_execution_event(wire) {
                                            on_event(ev);
                                        }
                                    }
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    last_frame_at = (clock)();
                                    let _ = stream.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(Message::Pong(_))) => {
                                    last_frame_at = (clock)();
                                }
                                Some(Ok(_)) => {
                                    last_frame_at = (clock)();
                                }
                                Some(Err(e)) => {
                                    tracing::warn!(url, error = %e, "private ws read error");
                                    break;
                                }
                                None => {
                                    tracing::warn!(url, "private ws closed by peer");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url, error = %e, attempt, "private ws connect failed");
            }
        }
        let disconnected_at = (clock)();
        on_disconnect((disconnected_at - connected_at).max(0));
        if *shutdown.borrow() {
            return;
        }
        tokio::time::sleep(reconnect_backoff(attempt)).await;
        attempt = attempt.saturating_add(1);
    }
}

fn to_execution_event(w: fbt_schemas::WireExecutionEvent) -> Option<fbt_core::ExecutionEvent> {
    let to_micros = |s: &str| fbt_gateway_live::wire::decimal_string_to_micros(s).ok();
    Some(fbt_core::ExecutionEvent {
        client_order_id: w.client_order_id,
        exchange_order_id: w.exchange_order_id,
        status: w.status,
        last_fill_qty: to_micros(&w.last_fill_qty)?,
        cum_fill_qty: to_micros(&w.cum_fill_qty)?,
        avg_price: w.avg_price.as_deref().and_then(to_micros),
        fee: w.fee.as_deref().and_then(to_micros),
        fee_ccy: w.fee_ccy,
        liquidity: w.liquidity.as_deref().and_then(|s| match s {
            "maker" => Some(fbt_core::Liquidity::Maker),
            "taker" => Some(fbt_core::Liquidity::Taker),
            _ => None,
        }),
        updated_ts_ms: w.updated_ts_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt_and_stays_capped() {
        for attempt in 0..20 {
            let d = reconnect_backoff(attempt);
            assert!(d.as_millis() as u64 <= MAX_BACKOFF_MS);
        }
    }

    #[test]
    fn parses_well_formed_ticker_frame() {
        let text = r#"{"symbol":"BTCUSDT","bid":"99.000000","ask":"101.000000","last":"100.000000","index":null,"mark":null,"ts_ms":1700000000000}"#;
        let tick = parse_public_frame(text).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.bid, Some(99_000_000));
        assert_eq!(tick.ask, Some(101_000_000));
    }

    #[test]
    fn malformed_frame_is_dropped() {
        assert!(parse_public_frame("not json").is_none());
    }
}
