//! Independent evidence that a level matters.

use std::collections::BTreeSet;

use super::Swings;
use crate::config::ConfluenceBonuses;
use crate::domain::{Zone, ZoneKind};

pub const TAG_MA: &str = "ma";
pub const TAG_ROUND: &str = "round";
pub const TAG_HTF: &str = "htf";
pub const TAG_VWAP: &str = "vwap";
pub const TAG_SWING: &str = "swing";

/// Round-number tolerance around the zone, in volatility units.
const ROUND_TOLERANCE_ATR: f64 = 0.1;

/// Context the confluence check needs from outside the zone itself.
#[derive(Debug, Clone, Copy)]
pub struct ConfluenceInputs<'a> {
    /// Latest long-period moving average.
    pub ma: Option<f64>,
    pub vwap: Option<f64>,
    /// Zones already selected on higher timeframes.
    pub higher: &'a [Zone],
    /// Swings found with a doubled window.
    pub major_swings: &'a Swings,
    pub vol: f64,
    /// Proximity radius for MA/VWAP, in volatility units.
    pub proximity_atr: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confluence {
    pub tags: BTreeSet<String>,
    /// Sum of bonuses, capped at 1.
    pub term: f64,
}

/// Nearest multiple of the round step inside `[lo, hi]`, if any.
fn round_level_within(mid: f64, lo: f64, hi: f64) -> Option<f64> {
    if !(mid.is_finite() && mid > 0.0) {
        return None;
    }
    let step = 10f64.powf(mid.log10().floor() - 1.0);
    let candidate = (lo / step).ceil() * step;
    (candidate <= hi).then_some(candidate)
}

pub fn evaluate(
    inputs: &ConfluenceInputs<'_>,
    bonuses: &ConfluenceBonuses,
    kind: ZoneKind,
    low: f64,
    high: f64,
) -> Confluence {
    let mid = (low + high) / 2.0;
    let near = |value: Option<f64>| {
        value.is_some_and(|v| v.is_finite() && (v - mid).abs() <= inputs.proximity_atr * inputs.vol)
    };

    let mut out = Confluence::default();
    let mut add = |tag: &str, bonus: f64| {
        out.tags.insert(tag.to_string());
        out.term += bonus;
    };

    if near(inputs.ma) {
        add(TAG_MA, bonuses.moving_average);
    }
    let pad = ROUND_TOLERANCE_ATR * inputs.vol;
    if round_level_within(mid, low - pad, high + pad).is_some() {
        add(TAG_ROUND, bonuses.round_number);
    }
    if inputs
        .higher
        .iter()
        .any(|z| z.kind == kind && z.overlaps(low, high))
    {
        add(TAG_HTF, bonuses.higher_timeframe);
    }
    if near(inputs.vwap) {
        add(TAG_VWAP, bonuses.vwap);
    }
    if inputs
        .major_swings
        .for_kind(kind)
        .iter()
        .any(|s| s.price >= low && s.price <= high)
    {
        add(TAG_SWING, bonuses.swing);
    }

    out.term = out.term.min(1.0);
    out
}
