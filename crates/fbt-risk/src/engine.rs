//! Risk manager: sliding-window/latch kill triggers.
//!
//! Evaluates WS-disconnect duration, hedge-latency p95 over a rolling
//! sample window, daily loss cut, API-error burst rate, and funding
//! sign-flip hysteresis, each as a sticky latch over an evidence map rather
//! than a one-shot threshold check.
//!
//! `flatten_all` is bound after construction rather than passed to `new`,
//! because the Strategy component that implements it depends on this risk
//! manager in turn (cyclic by reference, not by crate dependency — see
//! `fbt-strategy`).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::percentile::percentile;
use crate::types::{KillEvent, KillReason, RiskConfig};

const HEDGE_LATENCY_WINDOW: usize = 200;
const HEDGE_LATENCY_MIN_SAMPLES: usize = 20;
const API_ERROR_WINDOW_MS: i64 = 60_000;

pub struct RiskManager {
    cfg: RiskConfig,
    killed: AtomicBool,
    disable_new_orders: AtomicBool,
    hedge_latencies_ms: Mutex<VecDeque<i64>>,
    api_error_ts_ms: Mutex<VecDeque<i64>>,
    funding_flip_counts: Mutex<HashMap<String, u32>>,
    last_funding_predicted_e6: Mutex<HashMap<String, i64>>,
    flat_probe: Option<Box<dyn Fn() -> bool + Send + Sync>>,
    flatten_all: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    on_kill: Option<Box<dyn Fn(&KillEvent) + Send + Sync>>,
}

impl RiskManager {
    pub fn new(cfg: RiskConfig) -> Self {
        Self {
            cfg,
            killed: AtomicBool::new(false),
            disable_new_orders: AtomicBool::new(false),
            hedge_latencies_ms: Mutex::new(VecDeque::with_capacity(HEDGE_LATENCY_WINDOW)),
            api_error_ts_ms: Mutex::new(VecDeque::new()),
            funding_flip_counts: Mutex::new(HashMap::new()),
            last_funding_predicted_e6: Mutex::new(HashMap::new()),
            flat_probe: None,
            flatten_all: Mutex::new(None),
            on_kill: None,
        }
    }

    pub fn with_flat_probe(mut self, probe: Box<dyn Fn() -> bool + Send + Sync>) -> Self {
        self.flat_probe = Some(probe);
        self
    }

    pub fn with_kill_sink(mut self, sink: Box<dyn Fn(&KillEvent) + Send + Sync>) -> Self {
        self.on_kill = Some(sink);
        self
    }

    /// Bound once the Strategy component exists (cyclic-reference note).
    pub fn bind_flatten_all(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.flatten_all.lock().unwrap() = Some(cb);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn new_orders_allowed(&self) -> bool {
        !self.disable_new_orders.load(Ordering::SeqCst)
    }

    /// Ops-only entry path: clears the sticky latch.
    pub fn reset_kill(&self) {
        self.killed.store(false, Ordering::SeqCst);
        self.disable_new_orders.store(false, Ordering::SeqCst);
    }

    pub fn update_daily_pnl(&self, net_pnl_micros: i64) {
        if net_pnl_micros < -self.cfg.daily_loss_cut_micros.abs() {
            self.trigger_kill(
                KillEvent::new(KillReason::DailyLossCut)
                    .with_evidence("net_pnl_micros", net_pnl_micros.to_string())
                    .with_evidence("loss_cut_micros", self.cfg.daily_loss_cut_micros.to_string()),
            );
        }
    }

    pub fn record_ws_disconnect(&self, duration_ms: i64) {
        if duration_ms > self.cfg.ws_disconnect_threshold_ms {
            self.trigger_kill(
                KillEvent::new(KillReason::WsDisconnected)
                    .with_evidence("duration_ms", duration_ms.to_string())
                    .with_evidence("threshold_ms", self.cfg.ws_disconnect_threshold_ms.to_string()),
            );
        }
    }

    pub fn record_hedge_latency(&self, latency_ms: i64) {
        let mut buf = self.hedge_latencies_ms.lock().unwrap();
        buf.push_back(latency_ms);
        while buf.len() > HEDGE_LATENCY_WINDOW {
            buf.pop_front();
        }
        if buf.len() >= HEDGE_LATENCY_MIN_SAMPLES {
            let samples: Vec<i64> = buf.iter().copied().collect();
            drop(buf);
            let p95 = percentile(&samples, 95.0);
            if p95 > self.cfg.hedge_latency_p95_threshold_ms {
                self.trigger_kill(
                    KillEvent::new(KillReason::HedgeLatencyP95)
                        .with_evidence("p95_ms", p95.to_string())
                        .with_evidence("threshold_ms", self.cfg.hedge_latency_p95_threshold_ms.to_string()),
                );
            }
        }
    }

    pub fn record_api_error(&self, now_ms: i64) {
        let count = {
            let mut buf = self.api_error_ts_ms.lock().unwrap();
            buf.push_back(now_ms);
            while let Some(&front) = buf.front() {
                if now_ms - front > API_ERROR_WINDOW_MS {
                    buf.pop_front();
                } else {
                    break;
                }
            }
            buf.len() as u32
        };
        if count > self.cfg.api_error_max_in_60s {
            self.trigger_kill(
                KillEvent::new(KillReason::ApiErrorBurst)
                    .with_evidence("count", count.to_string())
                    .with_evidence("max_in_60s", self.cfg.api_error_max_in_60s.to_string()),
            );
        }
    }

    /// Funding sign-flip hysteresis: both-below-threshold resets the
    /// counter (noise gate); otherwise increments on a sign change and fires
    /// at `count >= max(1, flip_consecutive)`. Suppressed while the external
    /// flat probe reports no exposure.
    pub fn update_funding_predicted(&self, symbol: &str, predicted_rate_e6: i64) {
        let prev = {
            let mut last = self.last_funding_predicted_e6.lock().unwrap();
            let prev = last.get(symbol).copied();
            last.insert(symbol.to_string(), predicted_rate_e6);
            prev
        };

        let Some(prev) = prev else {
            self.funding_flip_counts.lock().unwrap().remove(symbol);
            return;
        };

        let min_abs = self.cfg.funding_flip_min_abs_e6;
        if prev.abs() < min_abs && predicted_rate_e6.abs() < min_abs {
            self.funding_flip_counts.lock().unwrap().remove(symbol);
            return;
        }

        if (prev as i128) * (predicted_rate_e6 as i128) < 0 {
            let mut counts = self.funding_flip_counts.lock().unwrap();
            let cnt = counts.entry(symbol.to_string()).or_insert(0);
            *cnt += 1;
            let threshold = self.cfg.funding_flip_consecutive.max(1);
            if *cnt >= threshold {
                counts.remove(symbol);
                drop(counts);

                if let Some(probe) = &self.flat_probe {
                    if probe() {
                        return;
                    }
                }
                self.trigger_kill(
                    KillEvent::new(KillReason::FundingSignFlip)
                        .with_evidence("symbol", symbol)
                        .with_evidence("prev_rate_e6", prev.to_string())
                        .with_evidence("new_rate_e6", predicted_rate_e6.to_string()),
                );
            }
        } else {
            self.funding_flip_counts.lock().unwrap().remove(symbol);
        }
    }

    fn trigger_kill(&self, event: KillEvent) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disable_new_orders.store(true, Ordering::SeqCst);
        if let Some(sink) = &self.on_kill {
            sink(&event);
        }
        tracing::error!(reason = event.reason.code(), "risk kill switch triggered");
        let cb = self.flatten_all.lock().unwrap();
        if let Some(cb) = cb.as_ref() {
            cb();
        }
    }
}
