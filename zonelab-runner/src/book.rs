//! Published zone sets, one immutable snapshot per symbol.
//!
//! Writers build a complete `SymbolZones` off to the side and swap it in
//! under a short write lock; readers clone the `Arc` and never observe a
//! half-updated set.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use zonelab_core::{SymbolZones, Timeframe, Zone, ZoneKind};

#[derive(Debug, Default)]
pub struct ZoneBook {
    snapshots: RwLock<BTreeMap<String, Arc<SymbolZones>>>,
}

impl ZoneBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the symbol's snapshot. Returns the previous one, if any.
    pub fn publish(&self, zones: SymbolZones) -> Option<Arc<SymbolZones>> {
        let snapshot = Arc::new(zones);
        let mut guard = self
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(snapshot.symbol.clone(), snapshot)
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<SymbolZones>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closest zone above `price` in the symbol's current snapshot.
    pub fn nearest_above(
        &self,
        symbol: &str,
        price: f64,
        kind: Option<ZoneKind>,
        timeframe: Option<Timeframe>,
    ) -> Option<Zone> {
        self.get(symbol)?
            .nearest_above(price, kind, timeframe)
            .cloned()
    }

    pub fn nearest_below(
        &self,
        symbol: &str,
        price: f64,
        kind: Option<ZoneKind>,
        timeframe: Option<Timeframe>,
    ) -> Option<Zone> {
        self.get(symbol)?
            .nearest_below(price, kind, timeframe)
            .cloned()
    }

    pub fn containing(&self, symbol: &str, price: f64, tolerance: f64) -> Vec<Zone> {
        self.get(symbol)
            .map(|snapshot| {
                snapshot
                    .containing(price, tolerance)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
