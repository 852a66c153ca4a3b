//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Timeframe;

/// OHLCV bar for a single symbol on a single timeframe.
///
/// Bars are immutable input supplied by the ingestion layer; the engine never
/// mutates them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, open/close inside the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// True when `[low, high]` intersects `[lo, hi]`.
    pub fn intersects(&self, lo: f64, hi: f64) -> bool {
        self.low <= hi && self.high >= lo
    }
}

/// Errors raised while validating a bar series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar {index} has a non-finite OHLC value")]
    NonFinite { index: usize },

    #[error("bar {index} is inconsistent (high < low or open/close outside the range)")]
    Inconsistent { index: usize },

    #[error("bar {index} is not newer than its predecessor")]
    OutOfOrder { index: usize },
}

/// An ordered bar series for one symbol and timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Check every bar is finite, internally consistent, and strictly newer than
    /// the one before it.
    pub fn validate(&self) -> Result<(), BarError> {
        for (index, bar) in self.bars.iter().enumerate() {
            if bar.is_void() {
                return Err(BarError::NonFinite { index });
            }
            if !bar.is_sane() {
                return Err(BarError::Inconsistent { index });
            }
            if index > 0 && bar.open_time <= self.bars[index - 1].open_time {
                return Err(BarError::OutOfOrder { index });
            }
        }
        Ok(())
    }

    /// Close time of the newest bar, used as "now" by the scoring and
    /// lifecycle stages.
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.bars
            .last()
            .map(|bar| bar.open_time + self.timeframe.duration())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}
