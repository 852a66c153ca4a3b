//! Per-cycle engine output and the zone queries consumers run against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{LifecycleEvent, Timeframe, Zone, ZoneEvent, ZoneKind};
use crate::pipeline::MergedZone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolZones {
    pub symbol: String,
    /// Newest bar close time across processed timeframes.
    pub as_of: Option<DateTime<Utc>>,
    /// Selected zones per processed timeframe, strongest first.
    pub by_timeframe: BTreeMap<Timeframe, Vec<Zone>>,
    pub merged: Vec<MergedZone>,
    pub events: Vec<ZoneEvent>,
    pub lifecycle_events: Vec<LifecycleEvent>,
}

impl SymbolZones {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            as_of: None,
            by_timeframe: BTreeMap::new(),
            merged: Vec::new(),
            events: Vec::new(),
            lifecycle_events: Vec::new(),
        }
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.by_timeframe.values().flatten()
    }

    pub fn zones_for(&self, tf: Timeframe) -> &[Zone] {
        self.by_timeframe.get(&tf).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_timeframe.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filtered(
        &self,
        kind: Option<ZoneKind>,
        timeframe: Option<Timeframe>,
    ) -> impl Iterator<Item = &Zone> {
        self.zones().filter(move |z| {
            kind.map_or(true, |k| z.kind == k) && timeframe.map_or(true, |tf| z.timeframe == tf)
        })
    }

    /// Closest zone lying entirely above `price`. Ties go to the stronger zone.
    pub fn nearest_above(
        &self,
        price: f64,
        kind: Option<ZoneKind>,
        timeframe: Option<Timeframe>,
    ) -> Option<&Zone> {
        self.filtered(kind, timeframe)
            .filter(|z| z.low > price)
            .min_by(|a, b| {
                (a.low - price)
                    .total_cmp(&(b.low - price))
                    .then(b.strength.total_cmp(&a.strength))
                    .then(a.timeframe.cmp(&b.timeframe))
            })
    }

    /// Closest zone lying entirely below `price`.
    pub fn nearest_below(
        &self,
        price: f64,
        kind: Option<ZoneKind>,
        timeframe: Option<Timeframe>,
    ) -> Option<&Zone> {
        self.filtered(kind, timeframe)
            .filter(|z| z.high < price)
            .min_by(|a, b| {
                (price - a.high)
                    .total_cmp(&(price - b.high))
                    .then(b.strength.total_cmp(&a.strength))
                    .then(a.timeframe.cmp(&b.timeframe))
            })
    }

    /// Zones whose band, widened by `tolerance` on both sides, holds `price`.
    /// Strongest first.
    pub fn containing(&self, price: f64, tolerance: f64) -> Vec<&Zone> {
        let tol = tolerance.max(0.0);
        let mut hits: Vec<&Zone> = self
            .zones()
            .filter(|z| price >= z.low - tol && price <= z.high + tol)
            .collect();
        hits.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then(a.timeframe.cmp(&b.timeframe))
                .then(a.mid.total_cmp(&b.mid))
        });
        hits
    }
}
