//! Shared runtime state for fbt-daemon.
//!
//! All types here are `Clone`-able (via `Arc`). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use fbt_core::OpsCheckRow;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
}

/// Static build metadata included in status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Point-in-time snapshot of Runner state, returned by GET /status and
/// carried inside SSE `status` events. Populated by the Runner's task set,
/// which owns `AppState.status` via `Arc<RwLock<_>>`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub run_id: Option<String>,
    /// "idle" | "running" | "halted"
    pub state: String,
    pub rows: Vec<OpsCheckRow>,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo { service: "fbt-daemon", version: env!("CARGO_PKG_VERSION") },
            status: Arc::new(RwLock::new(StatusSnapshot { state: "idle".to_string(), ..Default::default() })),
        }
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START.get_or_init(std::time::Instant::now).elapsed().as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval` and
/// republishes the current status snapshot alongside it.
pub fn spawn_heartbeat(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = state.bus.send(BusMsg::Heartbeat { ts_millis: ts });

            let mut snap = state.status.read().await.clone();
            snap.daemon_uptime_secs = uptime_secs();
            let _ = state.bus.send(BusMsg::Status(snap));
        }
    });
}
