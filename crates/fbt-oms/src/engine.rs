//! The OMS Engine — submit/cancel/event-ingestion orchestration atop
//! [`crate::state_machine`] and [`crate::id_alloc`].
//!
//! Every method that talks to the venue does so exclusively through
//! `Arc<dyn Gateway>`; the OMS never constructs a venue-specific
//! client and never durably stores a Gateway's own connection state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use fbt_core::{Bbo, ExecutionEvent, FbtError, FbtResult, Gateway, MonoClock, OrderRequest, OrderType, Side, Tif};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::id_alloc::{derive_child_id, InflightSet};
use crate::state_machine::{do_transition, ManagedOrder, OrderBook, StateEvent};

#[derive(Debug, Clone)]
pub enum OmsAuditEvent {
    OrderNew {
        client_order_id: String,
        symbol: String,
        side: Side,
        r#type: OrderType,
        qty: i64,
        price: Option<i64>,
    },
    OrderCanceled {
        client_order_id: String,
    },
    OrderRejected {
        client_order_id: String,
        reason: String,
    },
    TradeFill {
        client_order_id: String,
        fill_qty: i64,
        price: Option<i64>,
        fee: Option<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct OmsConfig {
    pub ws_stale_block_ms: i64,
    pub order_timeout_sec: i64,
    pub max_retries: u32,
    pub chase_min_reprice_bps: i64,
    pub chase_interval_ms: i64,
    pub chase_max_amends_per_min: u32,
    pub reject_burst_threshold: u32,
    pub reject_burst_window_ms: i64,
    pub symbol_cooldown_ms: i64,
    /// Venue quirk (Open question resolved): whether an `Untriggered`
    /// status string maps back to `NEW` instead of being treated as a fill
    /// update. Per-Gateway knob, defaults to `true`.
    pub map_untriggered_as_new: bool,
}

impl OmsConfig {
    pub fn conservative_defaults() -> Self {
        Self {
            ws_stale_block_ms: 5_000,
            order_timeout_sec: 20,
            max_retries: 3,
            chase_min_reprice_bps: 2,
            chase_interval_ms: 2_000,
            chase_max_amends_per_min: 10,
            reject_burst_threshold: 5,
            reject_burst_window_ms: 30_000,
            symbol_cooldown_ms: 60_000,
            map_untriggered_as_new: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ChaseState {
    last_amend_ms: i64,
    amends_in_window: u32,
    window_start_ms: i64,
}

pub struct Oms {
    gateway: Arc<dyn Gateway>,
    clock: MonoClock,
    cfg: OmsConfig,
    book: Mutex<OrderBook>,
    inflight: Mutex<InflightSet>,
    last_private_ws_ts_ms: AtomicI64,
    reject_events: Mutex<HashMap<String, VecDeque<i64>>>,
    cooldown_until: Mutex<HashMap<String, i64>>,
    chase_state: Mutex<HashMap<String, ChaseState>>,
    on_audit: Option<Box<dyn Fn(OmsAuditEvent) + Send + Sync>>,
}

impl Oms {
    pub fn new(gateway: Arc<dyn Gateway>, clock: MonoClock, cfg: OmsConfig) -> Self {
        let now = clock();
        Self {
            gateway,
            clock,
            cfg,
            book: Mutex::new(OrderBook::new()),
            inflight: Mutex::new(InflightSet::new()),
            last_private_ws_ts_ms: AtomicI64::new(now),
            reject_events: Mutex::new(HashMap::new()),
            cooldown_until: Mutex::new(HashMap::new()),
            chase_state: Mutex::new(HashMap::new()),
            on_audit: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: impl Fn(OmsAuditEvent) + Send + Sync + 'static) -> Self {
        self.on_audit = Some(Box::new(sink));
        self
    }

    fn audit(&self, event: OmsAuditEvent) {
        if let Some(sink) = &self.on_audit {
            sink(event);
        }
    }

    /// Called by the private WS consumer on every received frame, including
    /// heartbeats, to mark liveness for the staleness gate.
    pub fn mark_private_ws_alive(&self) {
        self.last_private_ws_ts_ms.store((self.clock)(), Ordering::SeqCst);
    }

    fn ws_stale(&self) -> Option<FbtError> {
        let now = (self.clock)();
        let last = self.last_private_ws_ts_ms.load(Ordering::SeqCst);
        let age_ms = now - last;
        if age_ms > self.cfg.ws_stale_block_ms {
            Some(FbtError::WsStale {
                age_ms,
                threshold_ms: self.cfg.ws_stale_block_ms,
            })
        } else {
            None
        }
    }

    /// `submit`.
    pub async fn submit(&self, req: OrderRequest) -> FbtResult<()> {
        req.validate().map_err(|m| FbtError::InvalidRequest(m.to_string()))?;

        let now = (self.clock)();
        {
            let cooldowns = self.cooldown_until.lock().await;
            if let Some(until) = cooldowns.get(&req.symbol) {
                if now < *until {
                    return Err(FbtError::RiskBreach(format!(
                        "symbol {} in reject-burst cooldown until {until}",
                        req.symbol
                    )));
                }
            }
        }

        if let Some(err) = self.ws_stale() {
            return Err(err);
        }

        {
            let inflight = self.inflight.lock().await;
            if inflight.contains(&req.client_order_id) {
                return Err(FbtError::RiskBreach(format!(
                    "duplicate_client_order_id: {}",
                    req.client_order_id
                )));
            }
        }

        {
            let mut inflight = self.inflight.lock().await;
            inflight.insert(req.client_order_id.clone());
        }

        let audit_event = OmsAuditEvent::OrderNew {
            client_order_id: req.client_order_id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            r#type: req.r#type,
            qty: req.qty,
            price: req.price,
        };

        match self.gateway.place_order(req.clone()).await {
            Ok(_venue_order) => {
                let mut book = self.book.lock().await;
                book.insert(ManagedOrder::new(req, now));
                drop(book);
                self.audit(audit_event);
                Ok(())
            }
            Err(e) => {
                let mut inflight = self.inflight.lock().await;
                inflight.remove(&audit_event_id(&audit_event));
                Err(e)
            }
        }
    }

    /// `cancel`. Idempotent: cancelling an already-closed order is a
    /// success, not an error.
    pub async fn cancel(&self, client_order_id: &str) -> FbtResult<()> {
        let already_terminal = {
            let book = self.book.lock().await;
            book.get(client_order_id).map(|o| o.state.is_terminal()).unwrap_or(true)
        };
        if already_terminal {
            return Ok(());
        }

        self.gateway.cancel_order(client_order_id).await?;

        let mut book = self.book.lock().await;
        if let Some(order) = book.get_mut(client_order_id) {
            order.state = do_transition(order.state, StateEvent::Cancel)
                .map_err(|e| FbtError::ExchangeError(e.to_string()))?;
        }
        drop(book);

        let mut inflight = self.inflight.lock().await;
        inflight.remove(client_order_id);
        drop(inflight);

        self.audit(OmsAuditEvent::OrderCanceled {
            client_order_id: client_order_id.to_string(),
        });
        Ok(())
    }

    fn map_status(&self, status: &str) -> StateEvent {
        let normalized = status.to_ascii_lowercase();
        match normalized.as_str() {
            "untriggered" if self.cfg.map_untriggered_as_new => StateEvent::PartialFill,
            "partially_filled" | "partial" => StateEvent::PartialFill,
            "filled" => StateEvent::Fill,
            "canceled" | "cancelled" => StateEvent::Cancel,
            "rejected" => StateEvent::Reject,
            _ => StateEvent::PartialFill,
        }
    }

    /// `on_execution_event`.
    pub async fn on_execution_event(&self, e: ExecutionEvent) -> FbtResult<()> {
        let mut book = self.book.lock().await;

        if book.already_applied(&e.client_order_id, e.updated_ts_ms) {
            return Ok(());
        }
        let Some(order) = book.get_mut(&e.client_order_id) else {
            warn!(client_order_id = %e.client_order_id, "execution event for unknown order");
            return Ok(());
        };
        if e.updated_ts_ms < order.last_event_ts_ms {
            return Ok(());
        }

        order.filled_qty = order.filled_qty.max(e.cum_fill_qty);
        if e.avg_price.is_some() {
            order.avg_price = e.avg_price;
        }
        if let Some(exch_id) = &e.exchange_order_id {
            order.exchange_order_id = Some(exch_id.clone());
        }
        order.last_event_ts_ms = e.updated_ts_ms;

        let event_kind = self.map_status(&e.status);
        let transitioned = do_transition(order.state, event_kind);
        let remaining = order.remaining_qty();
        let retries = order.retries;
        let req = order.req.clone();
        let symbol = req.symbol.clone();

        let new_state = match transitioned {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "illegal oms transition, leaving state unchanged");
                order.state
            }
        };
        order.state = new_state;
        book.mark_applied(&e.client_order_id, e.updated_ts_ms);

        if new_state == fbt_core::OrderLifecycleState::Rejected {
            self.record_reject(&symbol).await;
        }

        let should_resend = new_state == fbt_core::OrderLifecycleState::PartiallyFilled && remaining > 0;
        let is_terminal = new_state.is_terminal();
        drop(book);

        if e.last_fill_qty > 0 {
            self.audit(OmsAuditEvent::TradeFill {
                client_order_id: e.client_order_id.clone(),
                fill_qty: e.last_fill_qty,
                price: e.avg_price,
                fee: e.fee,
            });
        }

        if new_state == fbt_core::OrderLifecycleState::Rejected {
            self.audit(OmsAuditEvent::OrderRejected {
                client_order_id: e.client_order_id.clone(),
                reason: e.status.clone(),
            });
        }

        if should_resend {
            if retries < self.cfg.max_retries {
                self.resend_remainder(&req, &e.client_order_id, remaining, retries + 1)
                    .await?;
            } else {
                warn!(client_order_id = %e.client_order_id, "max retries exhausted, giving up on remainder");
            }
        }

        if is_terminal {
            let mut inflight = self.inflight.lock().await;
            inflight.remove(&e.client_order_id);
        }

        Ok(())
    }

    async fn resend_remainder(
        &self,
        parent_req: &OrderRequest,
        parent_id: &str,
        remaining_qty: i64,
        retry: u32,
    ) -> FbtResult<()> {
        let child_id = derive_child_id(parent_id, retry);
        let child_req = OrderRequest {
            symbol: parent_req.symbol.clone(),
            side: parent_req.side,
            r#type: OrderType::Market,
            qty: remaining_qty,
            price: None,
            tif: Tif::Ioc,
            reduce_only: parent_req.reduce_only,
            post_only: false,
            client_order_id: child_id,
        };
        {
            let mut book = self.book.lock().await;
            if let Some(parent) = book.get_mut(parent_id) {
                parent.retries = retry;
            }
        }
        self.submit(child_req).await
    }

    async fn record_reject(&self, symbol: &str) {
        let now = (self.clock)();
        let mut rejects = self.reject_events.lock().await;
        let window = rejects.entry(symbol.to_string()).or_default();
        window.push_back(now);
        while let Some(&front) = window.front() {
            if now - front > self.cfg.reject_burst_window_ms {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() as u32 >= self.cfg.reject_burst_threshold {
            let mut cooldowns = self.cooldown_until.lock().await;
            cooldowns.insert(symbol.to_string(), now + self.cfg.symbol_cooldown_ms);
            info!(symbol, "reject-burst cooldown engaged");
        }
    }

    /// `process_timeouts`. Best-effort cancel of stale non-terminal
    /// orders, followed by an IOC market resend of the unfilled remainder.
    pub async fn process_timeouts(&self) -> FbtResult<()> {
        let now = (self.clock)();
        let timed_out: Vec<(String, OrderRequest, i64, u32)> = {
            let book = self.book.lock().await;
            book.iter()
                .filter(|(_, o)| {
                    !o.state.is_terminal()
                        && (now - o.sent_at_ms) / 1000 > self.cfg.order_timeout_sec
                })
                .map(|(id, o)| (id.clone(), o.req.clone(), o.remaining_qty(), o.retries))
                .collect()
        };

        for (id, req, remaining, retries) in timed_out {
            let _ = self.gateway.cancel_order(&id).await;
            {
                let mut book = self.book.lock().await;
                if let Some(order) = book.get_mut(&id) {
                    order.state = fbt_core::OrderLifecycleState::Canceled;
                }
            }
            self.audit(OmsAuditEvent::OrderCanceled {
                client_order_id: id.clone(),
            });
            if remaining > 0 && retries < self.cfg.max_retries {
                self.resend_remainder(&req, &id, remaining, retries + 1).await?;
            }
        }
        Ok(())
    }

    /// `reconcile_inflight_open_orders`. Called at startup and after
    /// every private WS reconnect.
    pub async fn reconcile_inflight_open_orders(&self, symbols: &[String]) -> FbtResult<()> {
        let mut inflight = self.inflight.lock().await;
        for symbol in symbols {
            let open_orders = self.gateway.get_open_orders(symbol).await?;
            for order in open_orders {
                inflight.insert(order.client_order_id);
            }
        }
        Ok(())
    }

    /// `maintain_postonly_orders` — post-only chase.
    pub async fn maintain_postonly_orders(&self, symbols: &[String]) -> FbtResult<()> {
        let now = (self.clock)();
        for symbol in symbols {
            let bbo = match self.gateway.get_bbo(symbol).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            let Some(mid) = bbo.mid() else { continue };

            let candidates: Vec<(String, Side, i64)> = {
                let book = self.book.lock().await;
                book.iter()
                    .filter(|(_, o)| {
                        o.req.symbol == *symbol
                            && o.req.tif == Tif::PostOnly
                            && !o.state.is_terminal()
                    })
                    .filter_map(|(id, o)| o.req.price.map(|p| (id.clone(), o.req.side, p)))
                    .collect()
            };

            for (id, side, price) in candidates {
                let deviation_bps = (price - mid).abs() as i128 * 10_000 / mid.max(1) as i128;
                if deviation_bps < self.cfg.chase_min_reprice_bps as i128 {
                    continue;
                }
                if !self.chase_rate_limit_ok(&id, now).await {
                    continue;
                }
                let new_price = self.desired_chase_price(&bbo, side);
                let Some(new_price) = new_price else { continue };
                if self.gateway.amend_order(&id, new_price).await.is_ok() {
                    self.record_chase(&id, now).await;
                }
            }
        }
        Ok(())
    }

    fn desired_chase_price(&self, bbo: &Bbo, side: Side) -> Option<i64> {
        match side {
            Side::Buy => bbo.ask,
            Side::Sell => bbo.bid,
        }
    }

    async fn chase_rate_limit_ok(&self, id: &str, now: i64) -> bool {
        let mut states = self.chase_state.lock().await;
        let state = states.entry(id.to_string()).or_insert_with(|| ChaseState {
            last_amend_ms: i64::MIN,
            amends_in_window: 0,
            window_start_ms: now,
        });
        if now - state.last_amend_ms < self.cfg.chase_interval_ms {
            return false;
        }
        if now - state.window_start_ms > 60_000 {
            state.window_start_ms = now;
            state.amends_in_window = 0;
        }
        state.amends_in_window < self.cfg.chase_max_amends_per_min
    }

    async fn record_chase(&self, id: &str, now: i64) {
        let mut states = self.chase_state.lock().await;
        if let Some(state) = states.get_mut(id) {
            state.last_amend_ms = now;
            state.amends_in_window += 1;
        }
    }
}

fn audit_event_id(event: &OmsAuditEvent) -> String {
    match event {
        OmsAuditEvent::OrderNew { client_order_id, .. } => client_order_id.clone(),
        OmsAuditEvent::OrderCanceled { client_order_id } => client_order_id.clone(),
        OmsAuditEvent::OrderRejected { client_order_id, .. } => client_order_id.clone(),
        OmsAuditEvent::TradeFill { client_order_id, .. } => client_order_id.clone(),
    }
}
