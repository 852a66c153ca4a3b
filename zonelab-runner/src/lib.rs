//! ZoneLab Runner: multi-symbol orchestration around `zonelab-core`.
//!
//! This crate provides:
//! - TOML runner configuration with a nested engine table
//! - CSV bar loading with derived MA/VWAP confluence series
//! - `BatchRunner`: one rayon task per symbol, each owning its state
//! - `ZoneBook`: atomically swapped per-symbol snapshots for readers
//! - `EventLog`: append-only JSONL zone and lifecycle events

pub mod book;
pub mod config;
pub mod data_loader;
pub mod event_log;
pub mod runner;

pub use book::ZoneBook;
pub use config::{ConfigError, DeriveOptions, RunnerConfig};
pub use data_loader::{load_bars, load_symbol_input, LoadError};
pub use event_log::{EventLog, EventRecord};
pub use runner::{load_inputs, run_from_config_file, BatchRunner, CycleReport, RunError};
