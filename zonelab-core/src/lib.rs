//! ZoneLab Core: support/resistance zone detection and lifecycle.
//!
//! This crate turns OHLC bar series into a maintained, bounded set of price
//! zones per symbol and timeframe:
//! - Domain types (bars, timeframes, zones, events)
//! - Volatility and confluence indicators (ATR, SMA, VWAP)
//! - Pipeline stages: swings, clustering, quality filter, reactions,
//!   scoring, flips, lifecycle, selection
//! - `ZoneEngine`, which drives the stages top-down across timeframes
//!
//! Everything here is synchronous and free of I/O. Cross-cycle memory is an
//! explicit `SymbolState` owned by the caller.

pub mod config;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod pipeline;

pub use config::{ConfigError, TimeframeConfig, ZoneEngineConfig};
pub use domain::{
    Bar, BarSeries, LifecycleEvent, LifecycleState, StrengthClass, Timeframe, Zone, ZoneEvent,
    ZoneId, ZoneKind,
};
pub use engine::{EngineError, SymbolInput, SymbolState, SymbolZones, TimeframeInput, ZoneEngine};
pub use pipeline::MergedZone;
