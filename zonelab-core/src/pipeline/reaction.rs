//! Touch detection and reaction measurement.
//!
//! A touch is a bar whose range enters the zone while its predecessor's did
//! not. The reaction is the largest move away from the zone within the
//! lookahead window, in units of the touch bar's volatility:
//! for resistance `(min(bar.high, zone.high) - lowest low) / vol`, mirrored
//! for support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kde::median;
use crate::domain::{Bar, ZoneKind};
use crate::indicators::Volatility;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    pub index: usize,
    pub time: DateTime<Utc>,
    /// Deepest price reached on the zone's defended side.
    pub price: f64,
    /// Reaction magnitude in volatility units.
    pub reaction: f64,
    pub valid: bool,
    /// False when fewer than `lookahead` bars followed the touch.
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub touches: Vec<Touch>,
    pub valid_count: usize,
    /// Valid touches plus completed invalid ones. An invalid touch that is
    /// still inside its lookahead window is not yet counted against the zone.
    pub total_count: usize,
    pub last_valid: Option<DateTime<Utc>>,
    /// Median reaction of valid touches; 0 when there are none.
    pub median_reaction: f64,
}

/// Indices of bars that enter `[low, high]`.
pub fn touch_indices(bars: &[Bar], low: f64, high: f64) -> Vec<usize> {
    bars.iter()
        .enumerate()
        .filter(|(i, bar)| {
            bar.intersects(low, high) && (*i == 0 || !bars[i - 1].intersects(low, high))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Price a touch reached on the defended side, clipped to the zone.
pub fn touch_price(bar: &Bar, kind: ZoneKind, low: f64, high: f64) -> f64 {
    match kind {
        ZoneKind::Resistance => bar.high.min(high),
        ZoneKind::Support => bar.low.max(low),
    }
}

pub fn measure_reactions(
    bars: &[Bar],
    vol: &Volatility,
    kind: ZoneKind,
    low: f64,
    high: f64,
    lookahead: usize,
    valid_atr: f64,
) -> ReactionSummary {
    measure_reactions_with(bars, vol, |_| kind, low, high, lookahead, valid_atr)
}

/// Like `measure_reactions`, but each touch is judged against the side
/// `side_at(index)` defended at that bar.
pub fn measure_reactions_with(
    bars: &[Bar],
    vol: &Volatility,
    side_at: impl Fn(usize) -> ZoneKind,
    low: f64,
    high: f64,
    lookahead: usize,
    valid_atr: f64,
) -> ReactionSummary {
    let mut summary = ReactionSummary::default();
    let mut valid_reactions = Vec::new();

    for i in touch_indices(bars, low, high) {
        let bar = &bars[i];
        let kind = side_at(i);
        let reference = touch_price(bar, kind, low, high);
        let end = (i + lookahead).min(bars.len() - 1);
        let window = &bars[i + 1..=end];
        let excursion = match kind {
            ZoneKind::Resistance => window
                .iter()
                .map(|b| reference - b.low)
                .fold(0.0, f64::max),
            ZoneKind::Support => window
                .iter()
                .map(|b| b.high - reference)
                .fold(0.0, f64::max),
        };
        let reaction = excursion / vol.at(i);
        let valid = reaction >= valid_atr;
        let complete = end - i >= lookahead;

        if valid {
            summary.valid_count += 1;
            summary.last_valid = Some(bar.open_time);
            valid_reactions.push(reaction);
        }
        if valid || complete {
            summary.total_count += 1;
        }
        summary.touches.push(Touch {
            index: i,
            time: bar.open_time,
            price: reference,
            reaction,
            valid,
            complete,
        });
    }

    summary.median_reaction = if valid_reactions.is_empty() {
        0.0
    } else {
        median(&valid_reactions)
    };
    summary
}
