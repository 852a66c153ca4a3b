//! Runner configuration, loaded from TOML.
//!
//! ```toml
//! data_dir = "data"
//! symbols = ["BTCUSDT", "ETHUSDT"]
//! timeframes = ["1d", "4h", "1h"]   # optional, defaults to every enabled engine timeframe
//! event_log = "out/events.jsonl"     # optional
//! threads = 4                        # optional, defaults to the global rayon pool
//! ma_period = 200
//! derive_vwap = true
//!
//! [engine.timeframes.1h]
//! hard_cap = 12
//! ```
//!
//! Relative paths are resolved against the directory holding the config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use zonelab_core::{Timeframe, ZoneEngineConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse runner config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("engine config: {0}")]
    Engine(#[from] zonelab_core::ConfigError),

    #[error("no symbols configured")]
    NoSymbols,

    #[error("duplicate symbol '{0}'")]
    DuplicateSymbol(String),

    #[error("timeframe {0} is not enabled in the engine config")]
    TimeframeDisabled(Timeframe),

    #[error("threads must be >= 1")]
    ZeroThreads,
}

/// How the runner derives optional confluence series from the loaded bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveOptions {
    /// SMA period over closes; 0 disables the moving-average input.
    pub ma_period: usize,
    pub derive_vwap: bool,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            ma_period: 200,
            derive_vwap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub data_dir: PathBuf,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub timeframes: Vec<Timeframe>,
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(flatten)]
    pub derive: DeriveOptions,
    #[serde(default)]
    pub engine: ZoneEngineConfig,
}

impl RunnerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Read, parse and validate a config file. Relative `data_dir` and
    /// `event_log` paths are anchored at the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.data_dir = anchor(base, &config.data_dir);
            config.event_log = config.event_log.map(|p| anchor(base, &p));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen = std::collections::BTreeSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(symbol.clone()));
            }
        }
        for tf in &self.timeframes {
            if self.engine.timeframe(*tf).is_none() {
                return Err(ConfigError::TimeframeDisabled(*tf));
            }
        }
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }

    /// Timeframes to load, slowest first.
    pub fn active_timeframes(&self) -> Vec<Timeframe> {
        if self.timeframes.is_empty() {
            return self.engine.enabled_timeframes().map(|(tf, _)| tf).collect();
        }
        let mut tfs = self.timeframes.clone();
        tfs.sort();
        tfs.dedup();
        tfs
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        data_dir = "data"
        symbols = ["AAA", "BBB"]
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = RunnerConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.derive, DeriveOptions::default());
        assert_eq!(cfg.engine, ZoneEngineConfig::default());
        assert!(cfg.event_log.is_none());
        assert_eq!(cfg.active_timeframes(), Timeframe::ALL.to_vec());
        cfg.validate().unwrap();
    }

    #[test]
    fn nested_engine_table_overrides_one_field() {
        let cfg = RunnerConfig::from_toml_str(
            r#"
            data_dir = "data"
            symbols = ["AAA"]
            timeframes = ["1h", "1d", "1h"]
            ma_period = 50
            derive_vwap = false

            [engine.timeframes.1h]
            hard_cap = 12
            "#,
        )
        .unwrap();
        assert_eq!(cfg.derive.ma_period, 50);
        assert!(!cfg.derive.derive_vwap);
        assert_eq!(cfg.active_timeframes(), vec![Timeframe::D1, Timeframe::H1]);
        let h1 = cfg.engine.timeframe(Timeframe::H1).unwrap();
        assert_eq!(h1.hard_cap, 12);
        assert_eq!(h1.swing_window, 3);
    }

    #[test]
    fn empty_and_duplicate_symbols_are_rejected() {
        let mut cfg = RunnerConfig::from_toml_str(MINIMAL).unwrap();
        cfg.symbols.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoSymbols)));
        cfg.symbols = vec!["AAA".into(), "AAA".into()];
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateSymbol(s)) if s == "AAA"));
    }

    #[test]
    fn disabled_timeframe_is_rejected() {
        let cfg = RunnerConfig::from_toml_str(
            r#"
            data_dir = "data"
            symbols = ["AAA"]
            timeframes = ["15m"]

            [engine.timeframes.15m]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TimeframeDisabled(Timeframe::M15))
        ));
    }

    #[test]
    fn relative_paths_are_anchored_at_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.toml");
        std::fs::write(
            &path,
            "data_dir = \"bars\"\nsymbols = [\"AAA\"]\nevent_log = \"out/events.jsonl\"\n",
        )
        .unwrap();
        let cfg = RunnerConfig::load(&path).unwrap();
        assert_eq!(cfg.data_dir, dir.path().join("bars"));
        assert_eq!(cfg.event_log, Some(dir.path().join("out/events.jsonl")));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RunnerConfig::load(Path::new("/nonexistent/runner.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/runner.toml"));
    }
}
