//! ManagedOrder lifecycle state machine.
//!
//! ```text
//! NEW ──submit──▶ SENT ──partial_fill──▶ PARTIALLY_FILLED ──fill──▶ FILLED
//!                   │                          │
//!                   ├──cancel──▶ CANCELED     ├──cancel──▶ CANCELED
//!                   └──reject──▶ REJECTED     └──fill──▶ FILLED
//! ```
//!
//! Terminal states absorb further events: a late or duplicate execution
//! event arriving after `FILLED`/`CANCELED`/`REJECTED` is a no-op, not an
//! error — venues redeliver WS frames and the OMS must tolerate it.

use fbt_core::{OrderLifecycleState, OrderRequest};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    PartialFill,
    Fill,
    Cancel,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderLifecycleState,
    pub event: StateEvent,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal transition: {:?} from {:?}", self.event, self.from)
    }
}

impl std::error::Error for TransitionError {}

/// Apply `event` to `current`, returning the resulting state.
///
/// Terminal states silently absorb any event (see module docs). A
/// non-terminal state receiving an event with no matrix arm is an error —
/// in practice this should never reach here because venues only ever report
/// partial_fill/fill/cancel/reject, but the match is kept exhaustive so a
/// future event kind can't silently misroute.
pub fn do_transition(
    current: OrderLifecycleState,
    event: StateEvent,
) -> Result<OrderLifecycleState, TransitionError> {
    use OrderLifecycleState::*;
    use StateEvent::*;

    if current.is_terminal() {
        return Ok(current);
    }

    let next = match (current, event) {
        (New, PartialFill) | (Sent, PartialFill) | (PartiallyFilled, PartialFill) => PartiallyFilled,
        (New, Fill) | (Sent, Fill) | (PartiallyFilled, Fill) => Filled,
        (New, Cancel) | (Sent, Cancel) | (PartiallyFilled, Cancel) => Canceled,
        (New, Reject) | (Sent, Reject) => Rejected,
        (PartiallyFilled, Reject) => {
            return Err(TransitionError {
                from: current,
                event,
            })
        }
        (Filled, _) | (Canceled, _) | (Rejected, _) => unreachable!("terminal handled above"),
    };
    Ok(next)
}

/// OMS-owned order record keyed by `client_order_id` (ManagedOrder).
#[derive(Debug, Clone)]
pub struct ManagedOrder {
    pub req: OrderRequest,
    pub state: OrderLifecycleState,
    pub sent_at_ms: i64,
    pub exchange_order_id: Option<String>,
    pub filled_qty: i64,
    pub avg_price: Option<i64>,
    pub retries: u32,
    pub last_event_ts_ms: i64,
}

impl ManagedOrder {
    pub fn new(req: OrderRequest, sent_at_ms: i64) -> Self {
        debug_assert!(req.qty > 0, "ManagedOrder.req.qty must be > 0");
        Self {
            req,
            state: OrderLifecycleState::Sent,
            sent_at_ms,
            exchange_order_id: None,
            filled_qty: 0,
            avg_price: None,
            retries: 0,
            last_event_ts_ms: sent_at_ms,
        }
    }

    pub fn remaining_qty(&self) -> i64 {
        (self.req.qty - self.filled_qty).max(0)
    }
}

/// The book of all ManagedOrders plus the ids already applied, keyed so a
/// redelivered WS frame (same `client_order_id` + `updated_ts_ms`) is a
/// cheap no-op rather than a double fill.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: std::collections::HashMap<String, ManagedOrder>,
    seen_event_keys: HashSet<(String, i64)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: ManagedOrder) {
        self.orders.insert(order.req.client_order_id.clone(), order);
    }

    pub fn get(&self, client_order_id: &str) -> Option<&ManagedOrder> {
        self.orders.get(client_order_id)
    }

    pub fn get_mut(&mut self, client_order_id: &str) -> Option<&mut ManagedOrder> {
        self.orders.get_mut(client_order_id)
    }

    pub fn remove(&mut self, client_order_id: &str) -> Option<ManagedOrder> {
        self.orders.remove(client_order_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManagedOrder)> {
        self.orders.iter()
    }

    /// `true` if `(client_order_id, updated_ts_ms)` was already applied —
    /// the caller should drop the event silently (WS ordering).
    pub fn already_applied(&self, client_order_id: &str, updated_ts_ms: i64) -> bool {
        self.seen_event_keys
            .contains(&(client_order_id.to_string(), updated_ts_ms))
    }

    pub fn mark_applied(&mut self, client_order_id: &str, updated_ts_ms: i64) {
        self.seen_event_keys
            .insert((client_order_id.to_string(), updated_ts_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbt_core::{OrderType, Side, Tif};

    fn req(id: &str) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            r#type: OrderType::Market,
            qty: 10,
            price: None,
            tif: Tif::Ioc,
            reduce_only: false,
            post_only: false,
            client_order_id: id.into(),
        }
    }

    #[test]
    fn new_order_starts_sent() {
        let order = ManagedOrder::new(req("a"), 0);
        assert_eq!(order.state, OrderLifecycleState::Sent);
    }

    #[test]
    fn partial_then_full_fill() {
        let s1 = do_transition(OrderLifecycleState::Sent, StateEvent::PartialFill).unwrap();
        assert_eq!(s1, OrderLifecycleState::PartiallyFilled);
        let s2 = do_transition(s1, StateEvent::Fill).unwrap();
        assert_eq!(s2, OrderLifecycleState::Filled);
    }

    #[test]
    fn sent_can_fill_directly() {
        let s = do_transition(OrderLifecycleState::Sent, StateEvent::Fill).unwrap();
        assert_eq!(s, OrderLifecycleState::Filled);
    }

    #[test]
    fn cancel_from_partially_filled() {
        let s = do_transition(OrderLifecycleState::PartiallyFilled, StateEvent::Cancel).unwrap();
        assert_eq!(s, OrderLifecycleState::Canceled);
    }

    #[test]
    fn reject_after_partial_fill_is_illegal() {
        let err = do_transition(OrderLifecycleState::PartiallyFilled, StateEvent::Reject).unwrap_err();
        assert_eq!(err.from, OrderLifecycleState::PartiallyFilled);
    }

    #[test]
    fn terminal_state_absorbs_late_events() {
        let s = do_transition(OrderLifecycleState::Filled, StateEvent::PartialFill).unwrap();
        assert_eq!(s, OrderLifecycleState::Filled);
        let s2 = do_transition(OrderLifecycleState::Canceled, StateEvent::Fill).unwrap();
        assert_eq!(s2, OrderLifecycleState::Canceled);
    }

    #[test]
    fn remaining_qty_tracks_fills() {
        let mut order = ManagedOrder::new(req("a"), 0);
        order.filled_qty = 4;
        assert_eq!(order.remaining_qty(), 6);
        order.filled_qty = 10;
        assert_eq!(order.remaining_qty(), 0);
        order.filled_qty = 11;
        assert_eq!(order.remaining_qty(), 0);
    }

    #[test]
    fn order_book_tracks_applied_events() {
        let mut book = OrderBook::new();
        book.insert(ManagedOrder::new(req("a"), 0));
        assert!(!book.already_applied("a", 100));
        book.mark_applied("a", 100);
        assert!(book.already_applied("a", 100));
        assert!(!book.already_applied("a", 101));
    }
}
