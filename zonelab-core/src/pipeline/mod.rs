//! Zone detection pipeline stages.
//!
//! Every stage is a pure function over owned slices, except the lifecycle
//! manager, which mutates the per-timeframe records held in `SymbolState`.
//! The engine drives them in this order:
//!
//! 1. `swing` finds fractal highs and lows
//! 2. `cluster` groups nearby swing prices (1-D DBSCAN)
//! 3. `quality` drops outliers, guards width, checks KDE prominence
//! 4. `reaction` replays history for touches and reactions
//! 5. `confluence` + `scoring` produce the 0-100 strength
//! 6. `flip` detects confirmed role reversals
//! 7. `lifecycle` (+ `cooldown`) prunes, decays and classifies
//! 8. `selector` bounds and spaces the published list
//!
//! `events` and `merge` post-process the selected set.

pub mod cluster;
pub mod confluence;
pub mod cooldown;
pub mod events;
pub mod flip;
pub mod kde;
pub mod lifecycle;
pub mod merge;
pub mod quality;
pub mod reaction;
pub mod scoring;
pub mod selector;
pub mod swing;

pub use cluster::{cluster_points, Cluster};
pub use confluence::{Confluence, ConfluenceInputs};
pub use cooldown::{CooldownEntry, CooldownLedger};
pub use events::detect_events;
pub use flip::{apply_flip, detect_flip, detect_flips, side_at, FlipOutcome};
pub use kde::{DensityGrid, KdeError, Peak};
pub use lifecycle::{LifecycleManager, ZoneRecord};
pub use merge::{merge_zones, MergedZone};
pub use quality::{QualityFilter, WidthBounds};
pub use reaction::{measure_reactions, measure_reactions_with, ReactionSummary, Touch};
pub use scoring::{score_zone, ScoreBreakdown};
pub use selector::select_zones;
pub use swing::{find_swings, SwingKind, SwingPoint, Swings};

use chrono::{DateTime, Utc};

/// Fractional days between two instants; never negative.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_seconds() as f64 / 86_400.0).max(0.0)
}
