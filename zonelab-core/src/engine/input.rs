//! Per-cycle engine input.

use std::collections::BTreeMap;

use super::EngineError;
use crate::domain::{BarSeries, Timeframe};

/// One timeframe's bars plus optional precomputed series.
///
/// Every optional series must be aligned with the bars (same length).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeInput {
    pub series: BarSeries,
    /// Rolling true-range average; computed from the bars when absent.
    pub atr: Option<Vec<f64>>,
    /// Long-period moving average for confluence.
    pub ma: Option<Vec<f64>>,
    pub vwap: Option<Vec<f64>>,
}

impl TimeframeInput {
    pub fn new(series: BarSeries) -> Self {
        Self {
            series,
            atr: None,
            ma: None,
            vwap: None,
        }
    }

    pub fn with_atr(mut self, atr: Vec<f64>) -> Self {
        self.atr = Some(atr);
        self
    }

    pub fn with_ma(mut self, ma: Vec<f64>) -> Self {
        self.ma = Some(ma);
        self
    }

    pub fn with_vwap(mut self, vwap: Vec<f64>) -> Self {
        self.vwap = Some(vwap);
        self
    }

    pub(crate) fn validate(&self, timeframe: Timeframe) -> Result<(), EngineError> {
        if self.series.timeframe != timeframe {
            return Err(EngineError::TimeframeMismatch {
                expected: timeframe,
                got: self.series.timeframe,
            });
        }
        self.series
            .validate()
            .map_err(|source| EngineError::InvalidBars { timeframe, source })?;
        let expected = self.series.len();
        for (name, series) in [("atr", &self.atr), ("ma", &self.ma), ("vwap", &self.vwap)] {
            if let Some(values) = series {
                if values.len() != expected {
                    return Err(EngineError::SeriesLength {
                        timeframe,
                        series: name,
                        expected,
                        got: values.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Everything the engine sees for one symbol in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInput {
    pub symbol: String,
    pub timeframes: BTreeMap<Timeframe, TimeframeInput>,
}

impl SymbolInput {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframes: BTreeMap::new(),
        }
    }

    /// Add a timeframe, keyed by its series' timeframe.
    pub fn with_timeframe(mut self, input: TimeframeInput) -> Self {
        self.insert(input);
        self
    }

    pub fn insert(&mut self, input: TimeframeInput) {
        self.timeframes.insert(input.series.timeframe, input);
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        for (tf, input) in &self.timeframes {
            if input.series.symbol != self.symbol {
                return Err(EngineError::SymbolMismatch {
                    expected: self.symbol.clone(),
                    got: input.series.symbol.clone(),
                });
            }
            input.validate(*tf)?;
        }
        Ok(())
    }
}
