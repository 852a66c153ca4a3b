//! Zone interaction events for newly processed bars.

use crate::domain::{Bar, Zone, ZoneEvent, ZoneEventKind, ZoneKind};
use crate::indicators::Volatility;

use super::flip::{side_at, FlipOutcome};
use super::reaction::{touch_indices, touch_price};

/// Events for one zone on bars `from..`.
///
/// Touches and sweeps are reported against the side the zone defended at
/// that bar, so a flipped zone reports its old side up to each confirmation.
pub fn detect_events(
    zone: &Zone,
    bars: &[Bar],
    vol: &Volatility,
    from: usize,
    flips: &[FlipOutcome],
    sweep_atr: f64,
) -> Vec<ZoneEvent> {
    let defended = |i: usize| side_at(zone.formed_as, flips, i);
    let event = |kind: ZoneEventKind, i: usize, price: f64, side: ZoneKind, depth: f64| ZoneEvent {
        zone_id: zone.id.clone(),
        symbol: zone.symbol.clone(),
        timeframe: zone.timeframe,
        kind,
        bar_time: bars[i].open_time,
        price,
        side,
        penetration: depth / vol.at(i),
    };

    let mut events = Vec::new();

    for i in touch_indices(bars, zone.low, zone.high) {
        if i < from {
            continue;
        }
        let side = defended(i);
        let price = touch_price(&bars[i], side, zone.low, zone.high);
        let depth = match side {
            ZoneKind::Resistance => price - zone.low,
            ZoneKind::Support => zone.high - price,
        };
        events.push(event(ZoneEventKind::Touch, i, price, side, depth));
    }

    for (i, bar) in bars.iter().enumerate().skip(from) {
        let side = defended(i);
        let threshold = sweep_atr * vol.at(i);
        let (wick, held) = match side {
            ZoneKind::Resistance => (bar.high - zone.high, bar.close <= zone.high),
            ZoneKind::Support => (zone.low - bar.low, bar.close >= zone.low),
        };
        if wick > 0.0 && wick >= threshold && held {
            let price = match side {
                ZoneKind::Resistance => bar.high,
                ZoneKind::Support => bar.low,
            };
            events.push(event(ZoneEventKind::Sweep, i, price, side, wick));
        }
    }

    for f in flips {
        let old = f.from;
        let new = old.opposite();
        let past = |price: f64| match old {
            ZoneKind::Resistance => price - zone.high,
            ZoneKind::Support => zone.low - price,
        };
        if f.break_index >= from {
            let close = bars[f.break_index].close;
            events.push(event(ZoneEventKind::BodyBreak, f.break_index, close, old, past(close)));
        }
        if let Some(r) = f.retest_index.filter(|r| *r >= from) {
            let price = touch_price(&bars[r], new, zone.low, zone.high);
            let depth = match new {
                ZoneKind::Support => zone.high - price,
                ZoneKind::Resistance => price - zone.low,
            };
            events.push(event(ZoneEventKind::Retest, r, price, new, depth));
        }
        if f.confirm_index >= from {
            let close = bars[f.confirm_index].close;
            events.push(event(ZoneEventKind::Flip, f.confirm_index, close, new, past(close)));
        }
    }

    sort_events(&mut events);
    events
}

/// Timestamp, then zone id, then event kind.
pub fn sort_events(events: &mut [ZoneEvent]) {
    events.sort_by(|a, b| {
        a.bar_time
            .cmp(&b.bar_time)
            .then_with(|| a.zone_id.cmp(&b.zone_id))
            .then((a.kind as u8).cmp(&(b.kind as u8)))
    });
}
