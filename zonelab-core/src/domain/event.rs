//! Append-only records emitted by the engine.
//!
//! `ZoneEvent` describes price interacting with a zone; `LifecycleEvent`
//! records every state decision the lifecycle manager takes so pruning and
//! demotion stay auditable. Neither is mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LifecycleState, Timeframe, ZoneId, ZoneKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneEventKind {
    Touch,
    BodyBreak,
    Flip,
    Retest,
    Sweep,
}

/// Price interaction with a zone at a specific bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub zone_id: ZoneId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub kind: ZoneEventKind,
    pub bar_time: DateTime<Utc>,
    pub price: f64,
    /// Zone side at the time of the event.
    pub side: ZoneKind,
    /// How far price went past the relevant zone edge, in volatility units.
    pub penetration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Created,
    Promoted,
    Demoted,
    /// Dropped for staleness; recorded in the cooldown ledger.
    Pruned,
    /// Disappeared from the rebuilt candidate set without being pruned.
    Retired,
    /// Draft rejected because its level is still cooling down.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub zone_id: ZoneId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub action: LifecycleAction,
    pub from: Option<LifecycleState>,
    pub to: Option<LifecycleState>,
    pub strength: f64,
    pub at: DateTime<Utc>,
    pub reason: String,
}
