pub mod clock;
pub mod domain;
pub mod error;
pub mod micros;
pub mod ops_check;
pub mod retry;

pub use clock::{now_utc, scripted_clock, system_clock, MonoClock};
pub use domain::{
    Balance, Bbo, ExecutionEvent, FundingInfo, Gateway, InstrumentMeta, Liquidity, Order,
    OrderLifecycleState, OrderRequest, OrderType, Position, Side, Tif,
};
pub use error::{FbtError, FbtResult};
pub use micros::{f64_to_micros, lcm, micros_to_f64, round_down_to_step, round_to_tick, PricingError, MICROS_PER_UNIT};
pub use ops_check::{bbo_valid, OpsCheckRow};
pub use retry::{retry, RetryConfig};
