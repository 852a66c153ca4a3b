//! Typed, validated engine configuration.
//!
//! One `TimeframeConfig` per timeframe plus global blocks for each pipeline
//! stage. Everything has a default; TOML input only needs the fields it wants
//! to change. A `[timeframes."1h"]` table is overlaid on the 1h defaults, so a
//! partial table never silently picks up another timeframe's constants.
//!
//! `validate()` rejects inconsistent combinations eagerly. `ZoneEngine::new`
//! calls it, so a bad config fails at startup rather than per bar.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::Timeframe;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no timeframes enabled")]
    NoTimeframes,

    #[error("{timeframe}: min zone width ({min_atr} ATR / {min_pct}) must be below max width ({max_atr} ATR / {max_pct})")]
    WidthBounds {
        timeframe: Timeframe,
        min_atr: f64,
        max_atr: f64,
        min_pct: f64,
        max_pct: f64,
    },

    #[error("hysteresis inverted: demote score {demote} must not exceed active promotion score {promote}, which must not exceed key score {key}")]
    Hysteresis { demote: f64, promote: f64, key: f64 },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn ensure(cond: bool, field: impl Into<String>, reason: &str) -> Result<(), ConfigError> {
    if cond {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.to_string(),
        })
    }
}

// ── Per-timeframe ────────────────────────────────────────────────────

/// Width guard constants (all distances relative to volatility, price, or
/// the rolling high-low range).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidthGuardConfig {
    /// k_atr: max width as a multiple of volatility.
    pub max_width_atr: f64,
    /// k_pct: max width as a fraction of price.
    pub max_width_pct: f64,
    /// k_range: max width as a fraction of the rolling high-low range.
    pub max_width_range: f64,
    /// Bars in the rolling high-low range.
    pub range_lookback: usize,
    /// Minimum separation between two KDE peaks for a split, in volatility units.
    pub split_gap_atr: f64,
    pub min_width_atr: f64,
    pub min_width_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    pub enabled: bool,
    /// Symmetric fractal window k.
    pub swing_window: usize,
    pub atr_period: usize,
    /// Clustering radius ε = epsilon_atr_mult × volatility.
    pub epsilon_atr_mult: f64,
    pub width: WidthGuardConfig,
    /// Bars scanned after a touch to measure the reaction.
    pub reaction_lookahead: usize,
    /// Minimum reaction for a valid touch, in volatility units.
    pub reaction_valid_atr: f64,
    /// τ of the freshness term.
    pub freshness_tau_days: f64,
    pub timeframe_multiplier: f64,
    /// Zones without a valid touch for this long are pruned.
    pub staleness_days: f64,
    /// Bars a pruned level stays blocked.
    pub cooldown_bars: usize,
    pub hard_cap: usize,
    pub min_spacing_atr: f64,
}

impl TimeframeConfig {
    pub fn defaults_for(timeframe: Timeframe) -> Self {
        let (k, max_atr, max_pct, lookahead, tau, mult, stale, cooldown, cap, spacing) =
            match timeframe {
                Timeframe::D1 => (4, 1.2, 0.03, 5, 40.0, 1.2, 30.0, 5, 10, 0.7),
                Timeframe::H4 => (3, 1.0, 0.02, 8, 25.0, 1.1, 14.0, 10, 12, 0.6),
                Timeframe::H1 => (3, 0.8, 0.012, 10, 15.0, 1.0, 7.0, 20, 15, 0.5),
                Timeframe::M15 => (2, 0.6, 0.008, 12, 7.0, 0.95, 3.0, 40, 15, 0.4),
            };
        Self {
            enabled: true,
            swing_window: k,
            atr_period: 14,
            epsilon_atr_mult: 0.6,
            width: WidthGuardConfig {
                max_width_atr: max_atr,
                max_width_pct: max_pct,
                max_width_range: 0.15,
                range_lookback: 100,
                split_gap_atr: 0.5,
                min_width_atr: 0.1,
                min_width_pct: 0.0005,
            },
            reaction_lookahead: lookahead,
            reaction_valid_atr: 0.7,
            freshness_tau_days: tau,
            timeframe_multiplier: mult,
            staleness_days: stale,
            cooldown_bars: cooldown,
            hard_cap: cap,
            min_spacing_atr: spacing,
        }
    }

    /// Fewest bars that can produce a zone on this timeframe.
    pub fn min_bars(&self) -> usize {
        (2 * self.swing_window + 1)
            .max(self.atr_period + 1)
            .max(self.reaction_lookahead + 1)
    }

    fn validate(&self, tf: Timeframe) -> Result<(), ConfigError> {
        let f = |name: &str| format!("timeframes.{tf}.{name}");
        ensure(self.swing_window >= 1, f("swing_window"), "must be >= 1")?;
        ensure(self.atr_period >= 1, f("atr_period"), "must be >= 1")?;
        ensure(self.epsilon_atr_mult > 0.0, f("epsilon_atr_mult"), "must be > 0")?;
        let w = &self.width;
        ensure(w.min_width_atr > 0.0, f("width.min_width_atr"), "must be > 0")?;
        ensure(w.min_width_pct >= 0.0, f("width.min_width_pct"), "must be >= 0")?;
        if w.min_width_atr >= w.max_width_atr || w.min_width_pct >= w.max_width_pct {
            return Err(ConfigError::WidthBounds {
                timeframe: tf,
                min_atr: w.min_width_atr,
                max_atr: w.max_width_atr,
                min_pct: w.min_width_pct,
                max_pct: w.max_width_pct,
            });
        }
        ensure(w.max_width_range > 0.0, f("width.max_width_range"), "must be > 0")?;
        ensure(w.range_lookback >= 2, f("width.range_lookback"), "must be >= 2")?;
        ensure(w.split_gap_atr >= 0.0, f("width.split_gap_atr"), "must be >= 0")?;
        ensure(self.reaction_lookahead >= 1, f("reaction_lookahead"), "must be >= 1")?;
        ensure(self.reaction_valid_atr > 0.0, f("reaction_valid_atr"), "must be > 0")?;
        ensure(self.freshness_tau_days > 0.0, f("freshness_tau_days"), "must be > 0")?;
        ensure(self.timeframe_multiplier > 0.0, f("timeframe_multiplier"), "must be > 0")?;
        ensure(self.staleness_days > 0.0, f("staleness_days"), "must be > 0")?;
        ensure(self.hard_cap >= 1, f("hard_cap"), "must be >= 1")?;
        ensure(self.min_spacing_atr >= 0.0, f("min_spacing_atr"), "must be >= 0")?;
        Ok(())
    }
}

// ── Stage blocks ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Members with |z| above this are outliers.
    pub outlier_z: f64,
    pub shrink_lower_pct: f64,
    pub shrink_upper_pct: f64,
    /// Tallest-peak prominence / max density below this drops the cluster.
    pub min_prominence_ratio: f64,
    pub kde_grid_points: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            outlier_z: 3.0,
            shrink_lower_pct: 0.15,
            shrink_upper_pct: 0.85,
            min_prominence_ratio: 0.25,
            kde_grid_points: 128,
        }
    }
}

/// Relative weights of the score terms; normalized to sum 1 at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub touches: f64,
    pub reaction: f64,
    pub freshness: f64,
    pub confluence: f64,
    pub noise: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            touches: 0.22,
            reaction: 0.32,
            freshness: 0.16,
            confluence: 0.24,
            noise: 0.14,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.touches + self.reaction + self.freshness + self.confluence + self.noise
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceBonuses {
    pub moving_average: f64,
    pub round_number: f64,
    pub higher_timeframe: f64,
    pub vwap: f64,
    pub swing: f64,
}

impl Default for ConfluenceBonuses {
    fn default() -> Self {
        Self {
            moving_average: 0.2,
            round_number: 0.2,
            higher_timeframe: 0.5,
            vwap: 0.3,
            swing: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub bonuses: ConfluenceBonuses,
    /// MA/VWAP proximity radius, in volatility units.
    pub confluence_atr: f64,
    /// Recent closes inspected by the noise term.
    pub noise_lookback: usize,
    /// Fraction of closes inside the zone tolerated before it counts as chop.
    pub chop_threshold: f64,
    pub low_purity_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            bonuses: ConfluenceBonuses::default(),
            confluence_atr: 0.5,
            noise_lookback: 50,
            chop_threshold: 0.2,
            low_purity_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipConfig {
    pub body_break_atr: f64,
    pub confirmation_bars: usize,
    pub retest_lookahead: usize,
    pub retest_reaction_atr: f64,
    pub score_discount: f64,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            body_break_atr: 0.3,
            confirmation_bars: 2,
            retest_lookahead: 10,
            retest_reaction_atr: 0.4,
            score_discount: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub decay_per_day: f64,
    pub key_score: f64,
    pub key_min_touches: usize,
    pub active_min_touches: usize,
    pub active_min_purity: f64,
    /// Score a candidate needs to become active.
    pub active_promote_score: f64,
    /// Below this, any zone is forced back to candidate.
    pub demote_score: f64,
    pub demote_purity: f64,
    pub cooldown_capacity: usize,
    /// Relative bucket size used for ids and the cooldown ledger.
    pub id_bucket_pct: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            decay_per_day: 0.05,
            key_score: 80.0,
            key_min_touches: 3,
            active_min_touches: 2,
            active_min_purity: 0.65,
            active_promote_score: 55.0,
            demote_score: 50.0,
            demote_purity: 0.60,
            cooldown_capacity: 256,
            id_bucket_pct: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub bucket_atr: f64,
    pub max_per_bucket: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            bucket_atr: 1.0,
            max_per_bucket: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Wick excursion beyond the zone that counts as a sweep, in volatility units.
    pub sweep_atr: f64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { sweep_atr: 0.1 }
    }
}

// ── Top level ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneEngineConfig {
    #[serde(deserialize_with = "deserialize_timeframes")]
    pub timeframes: BTreeMap<Timeframe, TimeframeConfig>,
    pub quality: QualityConfig,
    pub scoring: ScoringConfig,
    pub flip: FlipConfig,
    pub lifecycle: LifecycleConfig,
    pub selector: SelectorConfig,
    pub events: EventConfig,
}

impl Default for ZoneEngineConfig {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            quality: QualityConfig::default(),
            scoring: ScoringConfig::default(),
            flip: FlipConfig::default(),
            lifecycle: LifecycleConfig::default(),
            selector: SelectorConfig::default(),
            events: EventConfig::default(),
        }
    }
}

fn default_timeframes() -> BTreeMap<Timeframe, TimeframeConfig> {
    Timeframe::ALL
        .into_iter()
        .map(|tf| (tf, TimeframeConfig::defaults_for(tf)))
        .collect()
}

/// Overlay each supplied timeframe table on that timeframe's defaults.
fn deserialize_timeframes<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<Timeframe, TimeframeConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<Timeframe, serde_json::Value>::deserialize(deserializer)?;
    let mut out = default_timeframes();
    for (tf, patch) in overrides {
        let mut base = serde_json::to_value(TimeframeConfig::defaults_for(tf))
            .map_err(serde::de::Error::custom)?;
        merge_json(&mut base, patch);
        let merged: TimeframeConfig =
            serde_json::from_value(base).map_err(serde::de::Error::custom)?;
        out.insert(tf, merged);
    }
    Ok(out)
}

fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

impl ZoneEngineConfig {
    /// Parse a TOML document. Missing fields take their defaults. The result
    /// is not yet validated.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Enabled timeframes in processing order.
    pub fn enabled_timeframes(&self) -> impl Iterator<Item = (Timeframe, &TimeframeConfig)> {
        self.timeframes
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(tf, cfg)| (*tf, cfg))
    }

    pub fn timeframe(&self, tf: Timeframe) -> Option<&TimeframeConfig> {
        self.timeframes.get(&tf).filter(|cfg| cfg.enabled)
    }

    /// Reject inconsistent combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_timeframes().next().is_none() {
            return Err(ConfigError::NoTimeframes);
        }
        for (tf, cfg) in self.enabled_timeframes() {
            cfg.validate(tf)?;
        }

        let q = &self.quality;
        ensure(q.outlier_z > 0.0, "quality.outlier_z", "must be > 0")?;
        ensure(
            0.0 <= q.shrink_lower_pct && q.shrink_lower_pct < q.shrink_upper_pct && q.shrink_upper_pct <= 1.0,
            "quality.shrink_lower_pct/shrink_upper_pct",
            "must satisfy 0 <= lower < upper <= 1",
        )?;
        ensure(
            (0.0..=1.0).contains(&q.min_prominence_ratio),
            "quality.min_prominence_ratio",
            "must be within [0, 1]",
        )?;
        ensure(q.kde_grid_points >= 8, "quality.kde_grid_points", "must be >= 8")?;

        let s = &self.scoring;
        let w = &s.weights;
        ensure(
            [w.touches, w.reaction, w.freshness, w.confluence, w.noise]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0),
            "scoring.weights",
            "weights must be finite and >= 0",
        )?;
        ensure(
            w.touches + w.reaction + w.freshness + w.confluence > 0.0,
            "scoring.weights",
            "positive terms must have a non-zero total weight",
        )?;
        let b = &s.bonuses;
        ensure(
            [b.moving_average, b.round_number, b.higher_timeframe, b.vwap, b.swing]
                .iter()
                .all(|v| *v >= 0.0),
            "scoring.bonuses",
            "bonuses must be >= 0",
        )?;
        ensure(s.confluence_atr >= 0.0, "scoring.confluence_atr", "must be >= 0")?;
        ensure(s.noise_lookback >= 1, "scoring.noise_lookback", "must be >= 1")?;
        ensure(
            (0.0..1.0).contains(&s.chop_threshold),
            "scoring.chop_threshold",
            "must be within [0, 1)",
        )?;

        let fl = &self.flip;
        ensure(fl.body_break_atr >= 0.0, "flip.body_break_atr", "must be >= 0")?;
        ensure(fl.confirmation_bars >= 1, "flip.confirmation_bars", "must be >= 1")?;
        ensure(fl.retest_lookahead >= 1, "flip.retest_lookahead", "must be >= 1")?;
        ensure(fl.retest_reaction_atr > 0.0, "flip.retest_reaction_atr", "must be > 0")?;
        ensure(
            fl.score_discount > 0.0 && fl.score_discount <= 1.0,
            "flip.score_discount",
            "must be within (0, 1]",
        )?;

        let l = &self.lifecycle;
        ensure(
            (0.0..1.0).contains(&l.decay_per_day),
            "lifecycle.decay_per_day",
            "must be within [0, 1)",
        )?;
        if !(l.demote_score <= l.active_promote_score
            && l.active_promote_score <= l.key_score
            && l.key_score <= 100.0)
        {
            return Err(ConfigError::Hysteresis {
                demote: l.demote_score,
                promote: l.active_promote_score,
                key: l.key_score,
            });
        }
        ensure(
            l.demote_purity <= l.active_min_purity,
            "lifecycle.demote_purity",
            "must not exceed active_min_purity",
        )?;
        ensure(l.active_min_touches >= 1, "lifecycle.active_min_touches", "must be >= 1")?;
        ensure(l.cooldown_capacity >= 1, "lifecycle.cooldown_capacity", "must be >= 1")?;
        ensure(l.id_bucket_pct > 0.0, "lifecycle.id_bucket_pct", "must be > 0")?;

        ensure(self.selector.bucket_atr > 0.0, "selector.bucket_atr", "must be > 0")?;
        ensure(self.selector.max_per_bucket >= 1, "selector.max_per_bucket", "must be >= 1")?;
        ensure(self.events.sweep_atr >= 0.0, "events.sweep_atr", "must be >= 0")?;
        Ok(())
    }
}
