//! Breakout and role-reversal detection.
//!
//! A resistance zone flips to support after a close above
//! `high + body_break_atr · vol`, confirmed either by the next
//! `confirmation_bars` closes all holding above the zone or by a retest
//! from above (low back into the zone, close still above it) followed by a
//! move away of at least `retest_reaction_atr · vol` within
//! `retest_lookahead` bars of the break. A close beyond the far side of the
//! zone abandons the candidate. Support mirrors all of this.
//!
//! Flips chain: once a flip is confirmed the zone defends the other side,
//! and the scan for the next break resumes on the bar after confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FlipConfig;
use crate::domain::{Bar, FlipState, Zone, ZoneKind};
use crate::indicators::Volatility;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlipOutcome {
    pub from: ZoneKind,
    /// Bar whose close broke through.
    pub break_index: usize,
    /// Bar that confirmed the flip.
    pub confirm_index: usize,
    /// Retest bar when confirmation came from a retest.
    pub retest_index: Option<usize>,
    pub confirmed_at: DateTime<Utc>,
}

/// Signed distance of a price beyond the zone in the breakout direction.
fn beyond(kind: ZoneKind, low: f64, high: f64, price: f64) -> f64 {
    match kind {
        ZoneKind::Resistance => price - high,
        ZoneKind::Support => low - price,
    }
}

/// True when a close has returned past the far side of the zone.
fn abandoned(kind: ZoneKind, low: f64, high: f64, close: f64) -> bool {
    match kind {
        ZoneKind::Resistance => close < low,
        ZoneKind::Support => close > high,
    }
}

/// Scan `bars[start..]` for the first confirmed flip.
pub fn detect_flip(
    bars: &[Bar],
    vol: &Volatility,
    kind: ZoneKind,
    low: f64,
    high: f64,
    start: usize,
    cfg: &FlipConfig,
) -> Option<FlipOutcome> {
    let n = bars.len();
    for i in start..n {
        if beyond(kind, low, high, bars[i].close) <= cfg.body_break_atr * vol.at(i) {
            continue;
        }
        if let Some(outcome) = confirm(bars, vol, kind, low, high, i, cfg) {
            return Some(outcome);
        }
    }
    None
}

/// Every confirmed flip from `start` on, in bar order, alternating sides
/// starting from `kind`.
pub fn detect_flips(
    bars: &[Bar],
    vol: &Volatility,
    kind: ZoneKind,
    low: f64,
    high: f64,
    start: usize,
    cfg: &FlipConfig,
) -> Vec<FlipOutcome> {
    let mut flips = Vec::new();
    let mut side = kind;
    let mut from = start;
    while let Some(outcome) = detect_flip(bars, vol, side, low, high, from, cfg) {
        side = side.opposite();
        from = outcome.confirm_index + 1;
        flips.push(outcome);
    }
    flips
}

/// Side defended at bar `index`: `formed_as` up to the first confirmation
/// bar, then the side each later confirmation switched to.
pub fn side_at(formed_as: ZoneKind, flips: &[FlipOutcome], index: usize) -> ZoneKind {
    flips
        .iter()
        .take_while(|f| index > f.confirm_index)
        .last()
        .map_or(formed_as, |f| f.from.opposite())
}

fn confirm(
    bars: &[Bar],
    vol: &Volatility,
    kind: ZoneKind,
    low: f64,
    high: f64,
    i: usize,
    cfg: &FlipConfig,
) -> Option<FlipOutcome> {
    let n = bars.len();
    let outcome = |confirm_index: usize, retest_index: Option<usize>| FlipOutcome {
        from: kind,
        break_index: i,
        confirm_index,
        retest_index,
        confirmed_at: bars[confirm_index].open_time,
    };

    // (a) consecutive closes beyond the zone
    let hold_end = i + cfg.confirmation_bars;
    if hold_end < n
        && bars[i + 1..=hold_end]
            .iter()
            .all(|b| beyond(kind, low, high, b.close) > 0.0)
    {
        return Some(outcome(hold_end, None));
    }

    // (b) retest and reaction inside the lookahead window
    let window_end = (i + cfg.retest_lookahead).min(n - 1);
    for j in i + 1..=window_end {
        let bar = &bars[j];
        if abandoned(kind, low, high, bar.close) {
            return None;
        }
        let retested = match kind {
            ZoneKind::Resistance => bar.low <= high && bar.close > high,
            ZoneKind::Support => bar.high >= low && bar.close < low,
        };
        if !retested {
            continue;
        }
        let threshold = cfg.retest_reaction_atr * vol.at(j);
        for (offset, after) in bars[j + 1..=window_end].iter().enumerate() {
            if abandoned(kind, low, high, after.close) {
                return None;
            }
            let extreme = match kind {
                ZoneKind::Resistance => after.high,
                ZoneKind::Support => after.low,
            };
            if beyond(kind, low, high, extreme) >= threshold {
                return Some(outcome(j + 1 + offset, Some(j)));
            }
        }
    }
    None
}

/// Apply a confirmed flip: swap the kind, record the prior side and discount
/// the historical score.
pub fn apply_flip(zone: &mut Zone, outcome: &FlipOutcome, score_discount: f64) {
    zone.kind = outcome.from.opposite();
    zone.flip = FlipState::Flipped {
        from: outcome.from,
        at: outcome.confirmed_at,
    };
    zone.raw_strength *= score_discount;
    zone.set_strength(zone.raw_strength);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::{ohlc, zone};

    // resistance zone [99, 100], vol 1.0, break threshold 100.3
    fn run(data: &[(f64, f64, f64)]) -> Option<FlipOutcome> {
        let bars = ohlc(data);
        let vol = Volatility::constant(1.0, bars.len());
        detect_flip(&bars, &vol, ZoneKind::Resistance, 99.0, 100.0, 0, &FlipConfig::default())
    }

    #[test]
    fn single_close_beyond_then_back_inside_does_not_flip() {
        let out = run(&[
            (99.5, 98.0, 98.5),
            (101.0, 98.5, 100.6), // break
            (100.7, 99.2, 99.5),  // back inside
            (99.8, 99.0, 99.4),
            (99.9, 99.1, 99.5),
            (99.7, 98.9, 99.2),
        ]);
        assert!(out.is_none());
    }

    #[test]
    fn two_confirming_closes_flip() {
        let out = run(&[
            (99.5, 98.0, 98.5),
            (101.0, 98.5, 100.6), // break
            (101.2, 100.2, 100.9),
            (101.5, 100.4, 101.1), // second close above
            (101.6, 100.8, 101.3),
        ])
        .unwrap();
        assert_eq!(out.from, ZoneKind::Resistance);
        assert_eq!(out.break_index, 1);
        assert_eq!(out.confirm_index, 3);
        assert!(out.retest_index.is_none());
    }

    #[test]
    fn retest_and_reaction_confirm() {
        let out = run(&[
            (99.5, 98.0, 98.5),
            (101.0, 98.5, 100.6), // break
            (100.8, 99.6, 100.1), // retest: dips into the zone, closes above
            (100.3, 99.5, 99.8),  // back inside, not abandoned
            (100.6, 99.7, 100.2), // high 100.6 >= 100 + 0.4
            (100.5, 99.9, 100.3),
        ])
        .unwrap();
        assert_eq!(out.retest_index, Some(2));
        assert_eq!(out.confirm_index, 4);
    }

    #[test]
    fn close_below_zone_abandons_candidate() {
        let out = run(&[
            (99.5, 98.0, 98.5),
            (101.0, 98.5, 100.6), // break
            (100.8, 98.0, 98.5),  // close below the zone
            (100.8, 98.5, 100.5),
        ]);
        assert!(out.is_none());
    }

    #[test]
    fn support_breakdown_flips_to_resistance() {
        let bars = ohlc(&[
            (51.0, 50.5, 50.8),
            (50.6, 49.0, 49.4), // close below 50 - 0.3
            (49.6, 48.8, 49.2),
            (49.5, 48.5, 49.0),
        ]);
        let vol = Volatility::constant(1.0, bars.len());
        let out = detect_flip(&bars, &vol, ZoneKind::Support, 50.0, 51.0, 0, &FlipConfig::default()).unwrap();
        assert_eq!(out.from, ZoneKind::Support);
        assert_eq!(out.confirm_index, 3);
    }

    #[test]
    fn breakdown_after_flip_flips_back() {
        // resistance [99, 100] broken up, then support broken down
        let bars = ohlc(&[
            (99.5, 98.0, 98.5),
            (101.0, 98.5, 100.6), // break up
            (101.2, 100.2, 100.9),
            (101.5, 100.4, 101.1), // confirmed support
            (101.2, 100.5, 100.8),
            (100.9, 98.0, 98.4), // break down through 99 - 0.3
            (98.6, 97.5, 98.0),
            (98.2, 97.0, 97.4), // confirmed resistance again
        ]);
        let vol = Volatility::constant(1.0, bars.len());
        let flips = detect_flips(&bars, &vol, ZoneKind::Resistance, 99.0, 100.0, 0, &FlipConfig::default());
        assert_eq!(flips.len(), 2);
        assert_eq!(flips[0].from, ZoneKind::Resistance);
        assert_eq!(flips[0].confirm_index, 3);
        assert_eq!(flips[1].from, ZoneKind::Support);
        assert_eq!(flips[1].break_index, 5);
        assert_eq!(flips[1].confirm_index, 7);

        assert_eq!(side_at(ZoneKind::Resistance, &flips, 3), ZoneKind::Resistance);
        assert_eq!(side_at(ZoneKind::Resistance, &flips, 4), ZoneKind::Support);
        assert_eq!(side_at(ZoneKind::Resistance, &flips, 7), ZoneKind::Support);
        assert_eq!(side_at(ZoneKind::Resistance, &[], 7), ZoneKind::Resistance);
    }

    #[test]
    fn no_break_means_no_flips() {
        let bars = ohlc(&[(99.5, 98.0, 98.5), (99.8, 98.2, 99.0), (99.6, 98.1, 98.7)]);
        let vol = Volatility::constant(1.0, bars.len());
        let flips = detect_flips(&bars, &vol, ZoneKind::Resistance, 99.0, 100.0, 0, &FlipConfig::default());
        assert!(flips.is_empty());
    }

    #[test]
    fn apply_flip_discounts_score() {
        let mut z = zone(ZoneKind::Resistance, 99.0, 100.0, 70.0);
        let outcome = FlipOutcome {
            from: ZoneKind::Resistance,
            break_index: 1,
            confirm_index: 3,
            retest_index: None,
            confirmed_at: z.created_at,
        };
        apply_flip(&mut z, &outcome, 0.6);
        assert_eq!(z.kind, ZoneKind::Support);
        assert_eq!(z.flip_side(), Some(ZoneKind::Resistance));
        assert!((z.raw_strength - 42.0).abs() < 1e-12);
        assert!((z.strength - 42.0).abs() < 1e-12);

        // a second flip discounts again and records the latest prior side
        let back = FlipOutcome {
            from: ZoneKind::Support,
            break_index: 5,
            confirm_index: 7,
            ..outcome
        };
        apply_flip(&mut z, &back, 0.6);
        assert_eq!(z.kind, ZoneKind::Resistance);
        assert_eq!(z.flip_side(), Some(ZoneKind::Support));
        assert!((z.raw_strength - 25.2).abs() < 1e-9);
    }
}
