//! Fixture builders for the domain types scenario tests construct
//! repeatedly: [`InstrumentMeta`], [`Bbo`], [`FundingInfo`].
//!
//! Each builder ships a conservative, round-number default (mirroring the
//! fixture `fbt-backtest`'s own determinism test hand-rolls) with `with_*`
//! overrides for the one or two fields a given test actually cares about.

use fbt_core::{Bbo, FundingInfo, InstrumentMeta, MICROS_PER_UNIT};

#[derive(Clone, Copy, Debug)]
pub struct InstrumentMetaFixture(InstrumentMeta);

impl Default for InstrumentMetaFixture {
    fn default() -> Self {
        Self(InstrumentMeta {
            price_scale: 2,
            tick_size: 1_000,
            qty_step_perp: 1_000,
            qty_step_spot: 1_000,
            min_qty_perp: 1_000,
            min_qty_spot: 1_000,
            min_notional_perp: 0,
            min_notional_spot: 0,
            multiplier: MICROS_PER_UNIT,
        })
    }
}

impl InstrumentMetaFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_size(mut self, tick_size: i64) -> Self {
        self.0.tick_size = tick_size;
        self
    }

    pub fn qty_step(mut self, perp: i64, spot: i64) -> Self {
        self.0.qty_step_perp = perp;
        self.0.qty_step_spot = spot;
        self
    }

    pub fn min_qty(mut self, perp: i64, spot: i64) -> Self {
        self.0.min_qty_perp = perp;
        self.0.min_qty_spot = spot;
        self
    }

    pub fn min_notional(mut self, perp: i64, spot: i64) -> Self {
        self.0.min_notional_perp = perp;
        self.0.min_notional_spot = spot;
        self
    }

    pub fn build(self) -> InstrumentMeta {
        self.0
    }
}

/// `bid`/`ask` in micros, `ts_ms` defaults to `0`.
pub fn bbo_fixture(bid: i64, ask: i64) -> Bbo {
    Bbo { bid: Some(bid), ask: Some(ask), ts_ms: 0 }
}

pub fn bbo_fixture_at(bid: i64, ask: i64, ts_ms: i64) -> Bbo {
    Bbo { bid: Some(bid), ask: Some(ask), ts_ms }
}

pub fn stale_bbo_fixture() -> Bbo {
    Bbo { bid: None, ask: None, ts_ms: 0 }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FundingInfoFixture(FundingInfo);

impl FundingInfoFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicted_rate_e6(mut self, rate_e6: i64) -> Self {
        self.0.predicted_rate_e6 = Some(rate_e6);
        self
    }

    pub fn current_rate_e6(mut self, rate_e6: i64) -> Self {
        self.0.current_rate_e6 = Some(rate_e6);
        self
    }

    pub fn next_funding_time_ms(mut self, ts_ms: i64) -> Self {
        self.0.next_funding_time_ms = Some(ts_ms);
        self
    }

    pub fn interval_hours(mut self, hours: u32) -> Self {
        self.0.interval_hours = Some(hours);
        self
    }

    pub fn build(self) -> FundingInfo {
        self.0
    }
}
