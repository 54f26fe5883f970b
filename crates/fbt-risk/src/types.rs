use std::collections::BTreeMap;

/// Risk manager thresholds.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskConfig {
    pub daily_loss_cut_micros: i64,
    pub ws_disconnect_threshold_ms: i64,
    pub hedge_latency_p95_threshold_ms: i64,
    pub api_error_max_in_60s: u32,
    pub funding_flip_min_abs_e6: i64,
    pub funding_flip_consecutive: u32,
}

impl RiskConfig {
    pub fn conservative_defaults() -> Self {
        Self {
            daily_loss_cut_micros: 0,
            ws_disconnect_threshold_ms: 30_000,
            hedge_latency_p95_threshold_ms: 2_000,
            api_error_max_in_60s: 10,
            funding_flip_min_abs_e6: 0,
            funding_flip_consecutive: 1,
        }
    }
}

/// Why a kill fired, with deterministic evidence for the audit stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KillReason {
    DailyLossCut,
    WsDisconnected,
    HedgeLatencyP95,
    ApiErrorBurst,
    FundingSignFlip,
    Manual,
}

impl KillReason {
    pub fn code(&self) -> &'static str {
        match self {
            KillReason::DailyLossCut => "KILL_DAILY_LOSS_CUT",
            KillReason::WsDisconnected => "KILL_WS_DISCONNECTED",
            KillReason::HedgeLatencyP95 => "KILL_HEDGE_LATENCY_P95",
            KillReason::ApiErrorBurst => "KILL_API_ERROR_BURST",
            KillReason::FundingSignFlip => "KILL_FUNDING_SIGN_FLIP",
            KillReason::Manual => "KILL_MANUAL",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KillEvent {
    pub reason: KillReason,
    pub evidence: BTreeMap<String, String>,
}

impl KillEvent {
    pub fn new(reason: KillReason) -> Self {
        Self {
            reason,
            evidence: BTreeMap::new(),
        }
    }

    pub fn with_evidence(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.evidence.insert(k.into(), v.into());
        self
    }
}
