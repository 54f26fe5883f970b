//! Shared error taxonomy.
//!
//! Every component returns `Result<T, FbtError>`. The variants are *kinds*,
//! not per-component error types — Gateway, OMS, Strategy and Risk all raise
//! the same enum so the Runner's task boundary can log and route uniformly
//! without knowing which component produced the error.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FbtError {
    /// Network connect/read timeout, socket reset. Retry via backoff.
    Transient(String),
    /// Venue 429 or local circuit breaker open. Retry with longer backoff.
    RateLimited(String),
    /// WS socket loss or idle timeout. Reconnect loop; reconcile after.
    WsDisconnected(String),
    /// Private WS healthy but stale at submission time. Refuse, don't kill.
    WsStale { age_ms: i64, threshold_ms: i64 },
    /// Quantity below min after quantisation, missing scale, bad shape.
    InvalidRequest(String),
    /// Notional/delta/slippage/price-deviation/duplicate-id limits.
    RiskBreach(String),
    /// Credentials or signature rejected.
    AuthFailure(String),
    /// Generic venue error not matching any other kind. No retry.
    ExchangeError(String),
    /// Malformed or missing venue response fields.
    DataError(String),
}

impl FbtError {
    /// Whether this error kind is eligible for the retry wrapper.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FbtError::Transient(_) | FbtError::RateLimited(_) | FbtError::WsDisconnected(_)
        )
    }
}

impl fmt::Display for FbtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FbtError::Transient(m) => write!(f, "transient: {m}"),
            FbtError::RateLimited(m) => write!(f, "rate limited: {m}"),
            FbtError::WsDisconnected(m) => write!(f, "ws disconnected: {m}"),
            FbtError::WsStale {
                age_ms,
                threshold_ms,
            } => write!(
                f,
                "ws stale: last event {age_ms}ms ago exceeds {threshold_ms}ms threshold"
            ),
            FbtError::InvalidRequest(m) => write!(f, "invalid request: {m}"),
            FbtError::RiskBreach(m) => write!(f, "risk breach: {m}"),
            FbtError::AuthFailure(m) => write!(f, "auth failure: {m}"),
            FbtError::ExchangeError(m) => write!(f, "exchange error: {m}"),
            FbtError::DataError(m) => write!(f, "data error: {m}"),
        }
    }
}

impl std::error::Error for FbtError {}

pub type FbtResult<T> = Result<T, FbtError>;
