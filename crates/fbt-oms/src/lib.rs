//! Order Management Engine: idempotent submission, lifecycle state
//! machine, partial-fill/timeout resend, out-of-order WS suppression,
//! inflight-id reconciliation, post-only chase, reject-burst cooldown.

pub mod engine;
pub mod id_alloc;
pub mod state_machine;

pub use engine::{Oms, OmsAuditEvent, OmsConfig};
pub use id_alloc::{derive_child_id, derive_client_order_id, InflightSet};
pub use state_machine::{do_transition, ManagedOrder, OrderBook, StateEvent, TransitionError};
