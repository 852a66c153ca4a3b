//! Persistent per-symbol engine state.
//!
//! Owned by the caller and passed by `&mut` into every update, so one
//! symbol's history is only ever written by one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Timeframe, Zone, ZoneId};
use crate::pipeline::{CooldownLedger, ZoneRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeframeState {
    pub records: BTreeMap<ZoneId, ZoneRecord>,
    /// Open time of the newest bar already scanned for events.
    pub watermark: Option<DateTime<Utc>>,
    /// Zones selected in the last completed cycle.
    pub published: Vec<Zone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolState {
    pub symbol: String,
    pub timeframes: BTreeMap<Timeframe, TimeframeState>,
    pub cooldown: CooldownLedger,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, cooldown_capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframes: BTreeMap::new(),
            cooldown: CooldownLedger::new(cooldown_capacity),
        }
    }

    pub fn timeframe(&self, tf: Timeframe) -> Option<&TimeframeState> {
        self.timeframes.get(&tf)
    }

    /// Zones published for a timeframe in the last cycle that processed it.
    pub fn published(&self, tf: Timeframe) -> &[Zone] {
        self.timeframes
            .get(&tf)
            .map(|s| s.published.as_slice())
            .unwrap_or(&[])
    }
}
