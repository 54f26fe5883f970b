//! Which config leaves each run mode is expected to consume — used by the
//! unused-keys hygiene check so a stale or misspelled key fails loudly
//! instead of being silently ignored.
//!
//! A registered pointer consumes itself and everything below it: listing a
//! subtree root (e.g. `/backtest`) marks the whole section read; listing a
//! single leaf (e.g. `/risk/loss_cut_daily_micros`) marks only that value,
//! leaving untouched siblings flagged as unused.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Backtest,
    Paper,
    Live,
}

pub fn consumed_pointers(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Backtest => BACKTEST,
        ConfigMode::Paper => PAPER,
        ConfigMode::Live => LIVE,
    }
}

static COMMON: &[&str] = &[
    "/runtime/mode",
    "/symbols",
    "/strategy",
    "/cost",
];

static BACKTEST: &[&str] = &[
    "/runtime/mode",
    "/symbols",
    "/strategy",
    "/cost",
    "/backtest",
];

static PAPER_LIVE_EXTRA: &[&str] = &[
    "/gateway",
    "/risk",
    "/daemon",
];

static PAPER: &[&str] = &[
    "/runtime/mode",
    "/symbols",
    "/strategy",
    "/cost",
    "/gateway",
    "/risk",
    "/daemon",
];

static LIVE: &[&str] = &[
    "/runtime/mode",
    "/symbols",
    "/strategy",
    "/cost",
    "/gateway",
    "/risk",
    "/daemon",
    "/allow_live",
];
