//! Multi-symbol batch runner.
//!
//! Each cycle fans out one rayon task per symbol. A task owns its symbol's
//! `SymbolState` for the duration of the update, so no state is shared
//! across threads; the finished zone sets are then published to the
//! `ZoneBook` and appended to the event log.
//!
//! A symbol whose input is rejected keeps its previous state and snapshot,
//! and the rest of the batch carries on.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rayon::prelude::*;
use thiserror::Error;

use zonelab_core::{EngineError, SymbolInput, SymbolState, ZoneEngine};

use crate::book::ZoneBook;
use crate::config::{ConfigError, RunnerConfig};
use crate::data_loader::{load_symbol_input, LoadError};
use crate::event_log::EventLog;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine config error: {0}")]
    EngineConfig(#[from] zonelab_core::ConfigError),

    #[error("failed to load '{symbol}': {source}")]
    Load {
        symbol: String,
        #[source]
        source: LoadError,
    },

    #[error("event log error: {0}")]
    EventLog(#[from] std::io::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of one batch cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Symbols whose snapshot was replaced, in symbol order.
    pub updated: Vec<String>,
    /// Symbols whose input the engine rejected.
    pub failed: Vec<(String, EngineError)>,
    pub zones: usize,
    pub events_logged: usize,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct BatchRunner {
    engine: ZoneEngine,
    states: BTreeMap<String, SymbolState>,
    book: Arc<ZoneBook>,
    event_log: Option<EventLog>,
    pool: Option<rayon::ThreadPool>,
}

impl BatchRunner {
    pub fn new(engine: ZoneEngine) -> Self {
        Self {
            engine,
            states: BTreeMap::new(),
            book: Arc::new(ZoneBook::new()),
            event_log: None,
            pool: None,
        }
    }

    /// Build from a validated runner config (engine, pool, event log).
    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunError> {
        config.validate()?;
        let mut runner = Self::new(ZoneEngine::new(config.engine.clone())?);
        if let Some(threads) = config.threads {
            runner = runner.with_threads(threads)?;
        }
        if let Some(path) = &config.event_log {
            runner = runner.with_event_log(EventLog::new(path));
        }
        Ok(runner)
    }

    /// Run cycles on a private pool instead of the global one.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, RunError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("zonelab-{i}"))
            .build()?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.event_log = Some(log);
        self
    }

    pub fn engine(&self) -> &ZoneEngine {
        &self.engine
    }

    /// Shared handle for readers; stays valid across cycles.
    pub fn book(&self) -> Arc<ZoneBook> {
        Arc::clone(&self.book)
    }

    pub fn state(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    /// Update every symbol in `inputs`. A symbol listed twice keeps its last
    /// input.
    pub fn run_cycle(&mut self, inputs: Vec<SymbolInput>) -> Result<CycleReport, RunError> {
        let mut by_symbol: BTreeMap<String, SymbolInput> = BTreeMap::new();
        for input in inputs {
            if by_symbol.contains_key(&input.symbol) {
                tracing::warn!(symbol = %input.symbol, "duplicate symbol input, keeping the last");
            }
            by_symbol.insert(input.symbol.clone(), input);
        }

        // Hand each task exclusive ownership of its state.
        let jobs: Vec<(SymbolState, SymbolInput)> = by_symbol
            .into_iter()
            .map(|(symbol, input)| {
                let state = self
                    .states
                    .remove(&symbol)
                    .unwrap_or_else(|| self.engine.new_state(symbol));
                (state, input)
            })
            .collect();

        let engine = &self.engine;
        let work = move || {
            jobs.into_par_iter()
                .map(|(mut state, input)| {
                    let result = engine.update(&mut state, &input);
                    (state, result)
                })
                .collect::<Vec<_>>()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        };

        // every state goes back before anything can fail
        let mut report = CycleReport::default();
        let mut log_error = None;
        for (state, result) in results {
            let symbol = state.symbol.clone();
            self.states.insert(symbol.clone(), state);
            match result {
                Ok(zones) => {
                    if let Some(log) = self.event_log.as_ref().filter(|_| log_error.is_none()) {
                        match log.append_cycle(&zones) {
                            Ok(n) => report.events_logged += n,
                            Err(e) => log_error = Some(e),
                        }
                    }
                    report.zones += zones.len();
                    self.book.publish(zones);
                    report.updated.push(symbol);
                }
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "symbol update rejected");
                    report.failed.push((symbol, err));
                }
            }
        }

        if let Some(e) = log_error {
            return Err(e.into());
        }
        tracing::info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            zones = report.zones,
            events = report.events_logged,
            "batch cycle complete"
        );
        Ok(report)
    }

    /// Load every configured symbol from disk and run one cycle.
    pub fn run_loaded(&mut self, config: &RunnerConfig) -> Result<CycleReport, RunError> {
        let inputs = load_inputs(config)?;
        self.run_cycle(inputs)
    }
}

/// Load all configured symbols in parallel. The first failure aborts.
pub fn load_inputs(config: &RunnerConfig) -> Result<Vec<SymbolInput>, RunError> {
    let timeframes = config.active_timeframes();
    config
        .symbols
        .par_iter()
        .map(|symbol| {
            load_symbol_input(&config.data_dir, symbol, &timeframes, &config.derive).map_err(
                |source| RunError::Load {
                    symbol: symbol.clone(),
                    source,
                },
            )
        })
        .collect()
}

/// Read a runner config file, load its data and run a single cycle.
pub fn run_from_config_file(path: &Path) -> anyhow::Result<(BatchRunner, CycleReport)> {
    let config = RunnerConfig::load(path)
        .with_context(|| format!("loading runner config {}", path.display()))?;
    let mut runner = BatchRunner::from_config(&config).context("building batch runner")?;
    let report = runner
        .run_loaded(&config)
        .with_context(|| format!("running {} symbols", config.symbols.len()))?;
    Ok((runner, report))
}
