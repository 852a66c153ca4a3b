//! Domain types for ZoneLab

pub mod bar;
pub mod event;
pub mod ids;
pub mod timeframe;
pub mod zone;

pub use bar::{Bar, BarError, BarSeries};
pub use event::{LifecycleAction, LifecycleEvent, ZoneEvent, ZoneEventKind};
pub use ids::{price_bucket, ZoneId};
pub use timeframe::{ParseTimeframeError, Timeframe};
pub use zone::{FlipState, LifecycleState, StrengthClass, Zone, ZoneKind};
