//! Risk manager: sliding-window/latch kill triggers over daily PnL,
//! WS-disconnect duration, hedge-latency p95, API-error bursts, and funding
//! sign-flip hysteresis. Pure/deterministic aside from the bound
//! `flatten_all` callback and optional flat-probe/kill-sink hooks.

mod engine;
mod percentile;
mod types;

pub use engine::RiskManager;
pub use percentile::percentile;
pub use types::{KillEvent, KillReason, RiskConfig};
