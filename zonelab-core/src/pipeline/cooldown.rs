//! Bounded ledger of recently pruned levels.
//!
//! A pruned zone leaves an entry keyed by timeframe, kind and price bucket.
//! Until the entry expires, drafts within one bucket of it are blocked from
//! re-entering the live set. The oldest entry is evicted when the ledger is
//! full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::{Timeframe, ZoneId, ZoneKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub zone_id: ZoneId,
    pub timeframe: Timeframe,
    pub kind: ZoneKind,
    pub bucket: i64,
    pub expires_at: DateTime<Utc>,
    /// Set once a blocked draft has been reported for this entry.
    pub reported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownLedger {
    capacity: usize,
    entries: VecDeque<CooldownEntry>,
}

impl CooldownLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CooldownEntry> {
        self.entries.iter()
    }

    pub fn record(
        &mut self,
        zone_id: ZoneId,
        timeframe: Timeframe,
        kind: ZoneKind,
        bucket: i64,
        expires_at: DateTime<Utc>,
    ) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CooldownEntry {
            zone_id,
            timeframe,
            kind,
            bucket,
            expires_at,
            reported: false,
        });
    }

    /// Live entry blocking this level at `now`, if any.
    pub fn blocking(
        &mut self,
        timeframe: Timeframe,
        kind: ZoneKind,
        bucket: i64,
        now: DateTime<Utc>,
    ) -> Option<&mut CooldownEntry> {
        self.entries.iter_mut().rev().find(|e| {
            e.timeframe == timeframe
                && e.kind == kind
                && (e.bucket - bucket).abs() <= 1
                && e.expires_at > now
        })
    }

    /// Drop entries that expired at or before `now`.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|e| e.expires_at > now);
    }
}
