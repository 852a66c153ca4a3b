//! Simple moving average of closes.
//!
//! Feeds the long-period MA used for MA-proximity confluence. A window that
//! contains a non-finite close yields NaN; the average resumes once the
//! window is clean again.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut out = vec![f64::NAN; closes.len()];
        for (end, window) in closes.windows(self.period).enumerate() {
            if window.iter().all(|c| c.is_finite()) {
                out[end + self.lookback()] = window.iter().sum::<f64>() / self.period as f64;
            }
        }
        out
    }
}
