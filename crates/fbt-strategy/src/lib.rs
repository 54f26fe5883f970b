//! Per-symbol funding/basis strategy: evaluate → Decision →
//! execute, against the venue-agnostic `fbt_core::Gateway`.

mod engine;
mod types;

pub use engine::FundingBasisStrategy;
pub use types::{annualize_rate, notional_candidate, Decision, Holding, StrategyConfig};
