//! Volume-weighted average price.
//!
//! Cumulative typical-price × volume over cumulative volume, anchored at the
//! first bar of the series. Bars with zero volume carry the previous value.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Default)]
pub struct Vwap;

impl Vwap {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut pv = 0.0;
        let mut vol = 0.0;
        bars.iter()
            .map(|bar| {
                if bar.volume > 0.0 && bar.typical_price().is_finite() {
                    pv += bar.typical_price() * bar.volume;
                    vol += bar.volume;
                }
                if vol > 0.0 {
                    pv / vol
                } else {
                    f64::NAN
                }
            })
            .collect()
    }
}
