//! Command handler modules for the `fbt` CLI.

pub mod backtest;
pub mod ops_check;
pub mod run;
