//! Multi-factor zone strength.
//!
//! `score = 100 · (Σ wᵢ·termᵢ − w_noise·noise) / Σw`, multiplied by the
//! timeframe factor and clamped to [0, 100].

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::domain::Bar;

/// Individual terms, kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub touches: f64,
    pub reaction: f64,
    pub freshness: f64,
    pub confluence: f64,
    pub noise: f64,
    pub score: f64,
}

/// Saturating, with a small penalty once a level is overused.
pub fn touches_term(valid_touches: usize) -> f64 {
    match valid_touches {
        0 => 0.0,
        1 => 0.4,
        2 => 0.65,
        3 => 0.85,
        4 => 0.95,
        5 | 6 => 1.0,
        _ => 0.9,
    }
}

/// Piecewise-linear map of the median reaction (volatility units).
pub fn reaction_term(reaction: f64) -> f64 {
    let lerp = |r: f64, r0: f64, r1: f64, v0: f64, v1: f64| v0 + (v1 - v0) * (r - r0) / (r1 - r0);
    match reaction {
        r if !r.is_finite() || r <= 0.0 => 0.0,
        r if r < 0.7 => 0.2 * r / 0.7,
        r if r < 1.0 => lerp(r, 0.7, 1.0, 0.2, 0.4),
        r if r < 1.5 => lerp(r, 1.0, 1.5, 0.4, 0.6),
        r if r < 2.0 => lerp(r, 1.5, 2.0, 0.6, 1.0),
        _ => 1.0,
    }
}

/// `exp(-days / tau)`; 0 when the zone has no valid touch.
pub fn freshness_term(days_since_touch: Option<f64>, tau_days: f64) -> f64 {
    match days_since_touch {
        Some(days) if tau_days > 0.0 => (-days.max(0.0) / tau_days).exp(),
        _ => 0.0,
    }
}

/// Chop penalty from recent closes inside the zone, plus a purity penalty.
pub fn noise_term(bars: &[Bar], low: f64, high: f64, purity: f64, cfg: &ScoringConfig) -> f64 {
    let start = bars.len().saturating_sub(cfg.noise_lookback);
    let recent = &bars[start..];
    let chop = if recent.is_empty() {
        0.0
    } else {
        let inside = recent
            .iter()
            .filter(|b| b.close >= low && b.close <= high)
            .count() as f64
            / recent.len() as f64;
        (inside - cfg.chop_threshold).max(0.0) / (1.0 - cfg.chop_threshold)
    };
    let penalty = if purity < 0.5 { cfg.low_purity_penalty } else { 0.0 };
    (chop + penalty).clamp(0.0, 1.0)
}

/// Combine precomputed terms into the final 0-100 score.
pub fn combine(breakdown: &mut ScoreBreakdown, cfg: &ScoringConfig, timeframe_multiplier: f64) -> f64 {
    let w = &cfg.weights;
    let total = w.total();
    let raw = if total > 0.0 {
        (w.touches * breakdown.touches
            + w.reaction * breakdown.reaction
            + w.freshness * breakdown.freshness
            + w.confluence * breakdown.confluence
            - w.noise * breakdown.noise)
            / total
    } else {
        0.0
    };
    let score = (100.0 * raw * timeframe_multiplier).clamp(0.0, 100.0);
    breakdown.score = if score.is_finite() { score } else { 0.0 };
    breakdown.score
}

/// Everything the scorer needs about one draft zone.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub bars: &'a [Bar],
    pub low: f64,
    pub high: f64,
    pub valid_touches: usize,
    pub purity: f64,
    pub median_reaction: f64,
    pub days_since_touch: Option<f64>,
    pub confluence: f64,
}

pub fn score_zone(
    inputs: &ScoreInputs<'_>,
    cfg: &ScoringConfig,
    tau_days: f64,
    timeframe_multiplier: f64,
) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown {
        touches: touches_term(inputs.valid_touches),
        reaction: reaction_term(inputs.median_reaction),
        freshness: freshness_term(inputs.days_since_touch, tau_days),
        confluence: inputs.confluence.clamp(0.0, 1.0),
        noise: noise_term(inputs.bars, inputs.low, inputs.high, inputs.purity, cfg),
        score: 0.0,
    };
    combine(&mut breakdown, cfg, timeframe_multiplier);
    breakdown
}
