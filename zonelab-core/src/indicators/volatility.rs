//! Per-bar volatility with a scalar fallback.
//!
//! Every distance threshold in the engine is expressed in volatility units.
//! The per-bar value is the ATR at that bar; bars inside the ATR warmup (or
//! with a non-positive ATR) use the scalar, which is the newest finite ATR.

use super::{last_finite, Atr, Indicator};
use crate::domain::Bar;

/// Fraction of the last close used when neither ATR nor bar ranges are usable.
const PRICE_FLOOR_FRACTION: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct Volatility {
    series: Vec<f64>,
    scalar: f64,
}

impl Volatility {
    /// Build from a supplied ATR series, or compute ATR(`period`) when none is
    /// given.
    pub fn from_bars(bars: &[Bar], period: usize, supplied: Option<&[f64]>) -> Self {
        let series = match supplied {
            Some(values) => values.to_vec(),
            None => Atr::new(period.max(1)).compute(bars),
        };
        let scalar = last_finite(&series)
            .filter(|v| *v > 0.0)
            .unwrap_or_else(|| degenerate_fallback(bars));
        Self { series, scalar }
    }

    /// Constant volatility, mostly useful for tests and synthetic inputs.
    pub fn constant(value: f64, len: usize) -> Self {
        Self {
            series: vec![value; len],
            scalar: value,
        }
    }

    /// Volatility at a bar index.
    pub fn at(&self, index: usize) -> f64 {
        match self.series.get(index) {
            Some(v) if v.is_finite() && *v > 0.0 => *v,
            _ => self.scalar,
        }
    }

    /// The timeframe's representative volatility (newest finite ATR).
    pub fn scalar(&self) -> f64 {
        self.scalar
    }
}

/// Mean bar range, then a fraction of price, then an absolute floor.
fn degenerate_fallback(bars: &[Bar]) -> f64 {
    let ranges: Vec<f64> = bars
        .iter()
        .map(Bar::range)
        .filter(|r| r.is_finite() && *r > 0.0)
        .collect();
    if !ranges.is_empty() {
        let mean = ranges.iter().sum::<f64>() / ranges.len() as f64;
        tracing::debug!(mean_range = mean, "ATR unavailable, using mean bar range");
        return mean;
    }
    let close = bars.last().map(|b| b.close.abs()).unwrap_or(0.0);
    let fallback = (close * PRICE_FLOOR_FRACTION).max(f64::EPSILON);
    tracing::warn!(fallback, "zero-range series, using price-fraction volatility");
    fallback
}
