//! Fractal swing detection.
//!
//! Bar i is a swing high iff its high is strictly above the high of every
//! other bar in [i-k, i+k]; swing lows mirror that on the low. The first and
//! last k bars never produce a swing.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, ZoneKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    /// Swing highs seed resistance, swing lows seed support.
    pub fn zone_kind(&self) -> ZoneKind {
        match self {
            SwingKind::High => ZoneKind::Resistance,
            SwingKind::Low => ZoneKind::Support,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub price: f64,
    pub index: usize,
    pub kind: SwingKind,
}

/// Swing highs and lows, each ordered by bar index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Swings {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

impl Swings {
    pub fn for_kind(&self, kind: ZoneKind) -> &[SwingPoint] {
        match kind {
            ZoneKind::Resistance => &self.highs,
            ZoneKind::Support => &self.lows,
        }
    }
}

pub fn find_swings(bars: &[Bar], k: usize) -> Swings {
    let mut swings = Swings::default();
    let n = bars.len();
    if k == 0 || n < 2 * k + 1 {
        return swings;
    }

    for i in k..n - k {
        let window = &bars[i - k..=i + k];
        let bar = &bars[i];
        let is_high = bar.high.is_finite()
            && window
                .iter()
                .enumerate()
                .all(|(j, other)| j == k || bar.high > other.high);
        let is_low = bar.low.is_finite()
            && window
                .iter()
                .enumerate()
                .all(|(j, other)| j == k || bar.low < other.low);

        if is_high {
            swings.highs.push(SwingPoint {
                price: bar.high,
                index: i,
                kind: SwingKind::High,
            });
        }
        if is_low {
            swings.lows.push(SwingPoint {
                price: bar.low,
                index: i,
                kind: SwingKind::Low,
            });
        }
    }
    swings
}
