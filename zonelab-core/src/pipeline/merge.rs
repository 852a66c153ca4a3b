//! Cross-timeframe merge of overlapping zones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::{Timeframe, Zone, ZoneId, ZoneKind};

/// Union of overlapping same-kind zones, possibly from several timeframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedZone {
    pub kind: ZoneKind,
    pub low: f64,
    pub high: f64,
    /// Strongest member strength.
    pub strength: f64,
    pub timeframes: BTreeSet<Timeframe>,
    pub zone_ids: Vec<ZoneId>,
}

impl MergedZone {
    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn is_multi_timeframe(&self) -> bool {
        self.timeframes.len() > 1
    }
}

/// Sweep each kind's zones by ascending low, joining any that overlap the
/// running group. Groups come out ordered by kind then low.
pub fn merge_zones<'a>(zones: impl IntoIterator<Item = &'a Zone>) -> Vec<MergedZone> {
    let mut sorted: Vec<&Zone> = zones.into_iter().collect();
    sorted.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then(a.low.total_cmp(&b.low))
            .then(a.timeframe.cmp(&b.timeframe))
            .then(a.id.cmp(&b.id))
    });

    let mut merged: Vec<MergedZone> = Vec::new();
    for zone in sorted {
        match merged.last_mut() {
            Some(group) if group.kind == zone.kind && zone.low <= group.high => {
                group.high = group.high.max(zone.high);
                group.strength = group.strength.max(zone.strength);
                group.timeframes.insert(zone.timeframe);
                group.zone_ids.push(zone.id.clone());
            }
            _ => merged.push(MergedZone {
                kind: zone.kind,
                low: zone.low,
                high: zone.high,
                strength: zone.strength,
                timeframes: BTreeSet::from([zone.timeframe]),
                zone_ids: vec![zone.id.clone()],
            }),
        }
    }
    merged
}
