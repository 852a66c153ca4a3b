//! Zone: the persistent support/resistance entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::{Timeframe, ZoneId};

/// Which side of price a zone defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Resistance,
    Support,
}

impl ZoneKind {
    pub fn opposite(&self) -> Self {
        match self {
            ZoneKind::Resistance => ZoneKind::Support,
            ZoneKind::Support => ZoneKind::Resistance,
        }
    }

    pub fn code(&self) -> char {
        match self {
            ZoneKind::Resistance => 'R',
            ZoneKind::Support => 'S',
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKind::Resistance => f.write_str("resistance"),
            ZoneKind::Support => f.write_str("support"),
        }
    }
}

/// Bucketed strength: <40 weak, 40–59 normal, 60–79 strong, >=80 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthClass {
    Weak,
    Normal,
    Strong,
    Key,
}

impl StrengthClass {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            StrengthClass::Key
        } else if score >= 60.0 {
            StrengthClass::Strong
        } else if score >= 40.0 {
            StrengthClass::Normal
        } else {
            StrengthClass::Weak
        }
    }
}

/// Persistent lifecycle state, ordered by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Candidate,
    Active,
    Key,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Candidate => f.write_str("candidate"),
            LifecycleState::Active => f.write_str("active"),
            LifecycleState::Key => f.write_str("key"),
        }
    }
}

/// Role-reversal state. A flipped zone remembers the kind it had before the
/// confirmed breakout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlipState {
    Normal,
    Flipped {
        from: ZoneKind,
        at: DateTime<Utc>,
    },
}

/// A price band acting as support or resistance.
///
/// Geometry invariant: `low < mid < high`, with the width inside the
/// per-timeframe bounds the quality filter enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Side currently defended.
    pub kind: ZoneKind,
    /// Side the zone defended when it formed. Flips alternate from here.
    pub formed_as: ZoneKind,

    pub low: f64,
    pub mid: f64,
    pub high: f64,

    /// Valid touches (reaction at or above the validity threshold).
    pub touch_count: usize,
    /// All touches, valid or not.
    pub total_touches: usize,
    pub last_touch: Option<DateTime<Utc>>,
    /// Median reaction of the valid touches, in volatility units.
    pub reaction_median: f64,

    /// Score after flip discount, before decay.
    pub raw_strength: f64,
    /// Decay-adjusted score in [0, 100].
    pub strength: f64,
    pub strength_class: StrengthClass,

    pub lifecycle: LifecycleState,
    pub flip: FlipState,
    pub confluence: BTreeSet<String>,

    /// Time the zone first entered the live set.
    pub created_at: DateTime<Utc>,
    /// Bar index of the newest swing that formed the zone.
    pub formed_at_index: usize,
}

impl Zone {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    /// Closed-interval overlap with another band.
    pub fn overlaps(&self, low: f64, high: f64) -> bool {
        self.low <= high && self.high >= low
    }

    /// Valid/total touch ratio; 0 when the zone was never touched.
    pub fn purity(&self) -> f64 {
        if self.total_touches == 0 {
            0.0
        } else {
            self.touch_count as f64 / self.total_touches as f64
        }
    }

    /// The kind the zone had before a confirmed flip, if any.
    pub fn flip_side(&self) -> Option<ZoneKind> {
        match self.flip {
            FlipState::Normal => None,
            FlipState::Flipped { from, .. } => Some(from),
        }
    }

    pub fn is_flipped(&self) -> bool {
        matches!(self.flip, FlipState::Flipped { .. })
    }

    /// Set the decay-adjusted strength and keep the class in sync.
    pub fn set_strength(&mut self, strength: f64) {
        let clamped = if strength.is_finite() {
            strength.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.strength = clamped;
        self.strength_class = StrengthClass::from_score(clamped);
    }

    /// Distance from a price to the zone's nearest edge; 0 inside the zone.
    pub fn distance_to(&self, price: f64) -> f64 {
        if price < self.low {
            self.low - price
        } else if price > self.high {
            price - self.high
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(StrengthClass::from_score(0.0), StrengthClass::Weak);
        assert_eq!(StrengthClass::from_score(39.99), StrengthClass::Weak);
        assert_eq!(StrengthClass::from_score(40.0), StrengthClass::Normal);
        assert_eq!(StrengthClass::from_score(59.9), StrengthClass::Normal);
        assert_eq!(StrengthClass::from_score(60.0), StrengthClass::Strong);
        assert_eq!(StrengthClass::from_score(79.9), StrengthClass::Strong);
        assert_eq!(StrengthClass::from_score(80.0), StrengthClass::Key);
        assert_eq!(StrengthClass::from_score(100.0), StrengthClass::Key);
    }

    #[test]
    fn kind_opposite_round_trips() {
        assert_eq!(ZoneKind::Resistance.opposite(), ZoneKind::Support);
        assert_eq!(ZoneKind::Support.opposite().opposite(), ZoneKind::Support);
    }

    #[test]
    fn lifecycle_rank_order() {
        assert!(LifecycleState::Key > LifecycleState::Active);
        assert!(LifecycleState::Active > LifecycleState::Candidate);
    }

    #[test]
    fn flip_state_serializes_tagged() {
        let json = serde_json::to_string(&FlipState::Normal).unwrap();
        assert_eq!(json, r#"{"state":"normal"}"#);
    }
}
