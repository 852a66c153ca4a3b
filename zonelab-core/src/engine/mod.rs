//! Zone engine: drives the pipeline top-down across timeframes.
//!
//! For each enabled timeframe, slowest first:
//!
//! 1. swings → clusters → quality filter → draft zones
//! 2. flip chain over the bars after the zone formed
//! 3. reactions (each touch against the side defended at that bar),
//!    confluence for the current side (against the higher timeframes
//!    already processed this cycle) and scoring
//! 4. lifecycle (prune, decay, classify) against the symbol's state
//! 5. selection, then events for bars past the timeframe watermark
//!
//! Finally overlapping zones are merged across timeframes. A timeframe with
//! too few bars yields an empty list rather than an error.

pub mod input;
pub mod output;
pub mod state;

pub use input::{SymbolInput, TimeframeInput};
pub use output::SymbolZones;
pub use state::{SymbolState, TimeframeState};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{ConfigError, TimeframeConfig, ZoneEngineConfig};
use crate::domain::{
    price_bucket, Bar, BarError, FlipState, LifecycleState, StrengthClass, Timeframe, Zone,
    ZoneId, ZoneKind,
};
use crate::indicators::{last_finite, Volatility};
use crate::pipeline::confluence::{self, ConfluenceInputs};
use crate::pipeline::events::sort_events;
use crate::pipeline::quality::rolling_range;
use crate::pipeline::scoring::ScoreInputs;
use crate::pipeline::{
    apply_flip, cluster_points, days_between, detect_events, detect_flips, find_swings,
    measure_reactions_with, merge_zones, score_zone, select_zones, side_at, Cluster,
    LifecycleManager, QualityFilter,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("symbol mismatch: expected {expected}, got {got}")]
    SymbolMismatch { expected: String, got: String },

    #[error("input keyed as {expected} carries {got} bars")]
    TimeframeMismatch { expected: Timeframe, got: Timeframe },

    #[error("invalid {timeframe} bars: {source}")]
    InvalidBars {
        timeframe: Timeframe,
        #[source]
        source: BarError,
    },

    #[error("{timeframe} {series} series has {got} values for {expected} bars")]
    SeriesLength {
        timeframe: Timeframe,
        series: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Stateless driver; all cross-cycle memory lives in `SymbolState`.
#[derive(Debug, Clone)]
pub struct ZoneEngine {
    config: ZoneEngineConfig,
}

/// Per-timeframe context shared by every draft.
struct DraftContext<'a> {
    symbol: &'a str,
    timeframe: Timeframe,
    tf_config: &'a TimeframeConfig,
    bars: &'a [Bar],
    vol: &'a Volatility,
    confluence: ConfluenceInputs<'a>,
    filter: QualityFilter<'a>,
    as_of: DateTime<Utc>,
}

impl ZoneEngine {
    /// Validate the configuration and build the engine.
    pub fn new(config: ZoneEngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ZoneEngineConfig {
        &self.config
    }

    /// Fresh state for a symbol, sized from the lifecycle config.
    pub fn new_state(&self, symbol: impl Into<String>) -> SymbolState {
        SymbolState::new(symbol, self.config.lifecycle.cooldown_capacity)
    }

    /// Run one cycle for a symbol.
    ///
    /// Input is validated before any state is touched, so an error leaves
    /// `state` exactly as it was.
    pub fn update(
        &self,
        state: &mut SymbolState,
        input: &SymbolInput,
    ) -> Result<SymbolZones, EngineError> {
        if state.symbol != input.symbol {
            return Err(EngineError::SymbolMismatch {
                expected: state.symbol.clone(),
                got: input.symbol.clone(),
            });
        }
        input.validate()?;

        let mut out = SymbolZones::new(input.symbol.clone());
        let mut higher: Vec<Zone> = Vec::new();

        for (tf, tf_config) in self.config.enabled_timeframes() {
            let selected = match input.timeframes.get(&tf) {
                Some(tf_input) => {
                    let zones =
                        self.process_timeframe(tf, tf_config, tf_input, &higher, state, &mut out);
                    out.by_timeframe.insert(tf, zones.clone());
                    zones
                }
                // not refreshed this cycle: its last published set still
                // counts as higher-timeframe context
                None => state.published(tf).to_vec(),
            };
            higher.extend(selected);
        }

        out.merged = merge_zones(out.zones());
        sort_events(&mut out.events);

        tracing::info!(
            symbol = %input.symbol,
            timeframes = out.by_timeframe.len(),
            zones = out.len(),
            merged = out.merged.len(),
            events = out.events.len(),
            lifecycle_events = out.lifecycle_events.len(),
            "zone update complete"
        );
        Ok(out)
    }

    fn process_timeframe(
        &self,
        tf: Timeframe,
        tf_config: &TimeframeConfig,
        input: &TimeframeInput,
        higher: &[Zone],
        state: &mut SymbolState,
        out: &mut SymbolZones,
    ) -> Vec<Zone> {
        let bars = input.series.bars.as_slice();
        let as_of = match input.series.as_of() {
            Some(as_of) if bars.len() >= tf_config.min_bars() => as_of,
            _ => {
                tracing::debug!(
                    symbol = %input.series.symbol,
                    timeframe = %tf,
                    bars = bars.len(),
                    required = tf_config.min_bars(),
                    "insufficient bars, no zones"
                );
                return Vec::new();
            }
        };
        out.as_of = out.as_of.max(Some(as_of));

        let vol = Volatility::from_bars(bars, tf_config.atr_period, input.atr.as_deref());
        let swings = find_swings(bars, tf_config.swing_window);
        let major_swings = find_swings(bars, tf_config.swing_window * 2);

        let ctx = DraftContext {
            symbol: &input.series.symbol,
            timeframe: tf,
            tf_config,
            bars,
            vol: &vol,
            confluence: ConfluenceInputs {
                ma: input.ma.as_deref().and_then(last_finite),
                vwap: input.vwap.as_deref().and_then(last_finite),
                higher,
                major_swings: &major_swings,
                vol: vol.scalar(),
                proximity_atr: self.config.scoring.confluence_atr,
            },
            filter: QualityFilter {
                quality: &self.config.quality,
                guard: &tf_config.width,
                vol: vol.scalar(),
                rolling_range: rolling_range(bars, tf_config.width.range_lookback),
            },
            as_of,
        };

        let eps = tf_config.epsilon_atr_mult * vol.scalar();
        let mut drafts = Vec::new();
        for kind in [ZoneKind::Resistance, ZoneKind::Support] {
            let clusters = cluster_points(swings.for_kind(kind), eps, 2);
            let raw = clusters.len();
            for cluster in clusters {
                for accepted in ctx.filter.apply(cluster) {
                    drafts.push(self.draft_zone(&ctx, kind, &accepted));
                }
            }
            tracing::debug!(
                symbol = ctx.symbol,
                timeframe = %tf,
                kind = %kind,
                swings = swings.for_kind(kind).len(),
                clusters = raw,
                "clustered swings"
            );
        }
        drafts.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(a.mid.total_cmp(&b.mid))
                .then(a.id.cmp(&b.id))
        });

        let manager = LifecycleManager {
            config: &self.config.lifecycle,
            timeframe: tf,
            tf_config,
        };
        let tf_state = state.timeframes.entry(tf).or_default();
        let (live, lifecycle_events) = manager.run(
            ctx.symbol,
            drafts,
            &mut tf_state.records,
            &mut state.cooldown,
            as_of,
        );
        let selected = select_zones(live, vol.scalar(), tf_config, &self.config.selector);

        let from = tf_state
            .watermark
            .map_or(0, |w| bars.partition_point(|b| b.open_time <= w));
        for zone in &selected {
            let flips = if zone.is_flipped() {
                detect_flips(
                    bars,
                    &vol,
                    zone.formed_as,
                    zone.low,
                    zone.high,
                    zone.formed_at_index + 1,
                    &self.config.flip,
                )
            } else {
                Vec::new()
            };
            out.events.extend(detect_events(
                zone,
                bars,
                &vol,
                from,
                &flips,
                self.config.events.sweep_atr,
            ));
        }

        tf_state.watermark = bars.last().map(|b| b.open_time);
        tf_state.published = selected.clone();
        out.lifecycle_events.extend(lifecycle_events);
        selected
    }

    fn draft_zone(&self, ctx: &DraftContext<'_>, kind: ZoneKind, cluster: &Cluster) -> Zone {
        let tf_config = ctx.tf_config;
        let (low, mid, high) = ctx.filter.draft_bounds(cluster);
        let formed_at_index = cluster.newest_index();
        let flips = detect_flips(
            ctx.bars,
            ctx.vol,
            kind,
            low,
            high,
            formed_at_index + 1,
            &self.config.flip,
        );
        let current = side_at(kind, &flips, ctx.bars.len());

        // each touch is judged by the side the zone defended at that bar
        let reactions = measure_reactions_with(
            ctx.bars,
            ctx.vol,
            |i| side_at(kind, &flips, i),
            low,
            high,
            tf_config.reaction_lookahead,
            tf_config.reaction_valid_atr,
        );
        let confluence =
            confluence::evaluate(&ctx.confluence, &self.config.scoring.bonuses, current, low, high);

        let scoring_purity = if reactions.total_count == 0 {
            1.0
        } else {
            reactions.valid_count as f64 / reactions.total_count as f64
        };
        let breakdown = score_zone(
            &ScoreInputs {
                bars: ctx.bars,
                low,
                high,
                valid_touches: reactions.valid_count,
                purity: scoring_purity,
                median_reaction: reactions.median_reaction,
                days_since_touch: reactions.last_valid.map(|t| days_between(t, ctx.as_of)),
                confluence: confluence.term,
            },
            &self.config.scoring,
            tf_config.freshness_tau_days,
            tf_config.timeframe_multiplier,
        );

        let mut zone = Zone {
            id: ZoneId::derive(
                ctx.timeframe,
                kind,
                price_bucket(mid, self.config.lifecycle.id_bucket_pct),
            ),
            symbol: ctx.symbol.to_string(),
            timeframe: ctx.timeframe,
            kind,
            formed_as: kind,
            low,
            mid,
            high,
            touch_count: reactions.valid_count,
            total_touches: reactions.total_count,
            last_touch: reactions.last_valid,
            reaction_median: reactions.median_reaction,
            raw_strength: breakdown.score,
            strength: breakdown.score,
            strength_class: StrengthClass::from_score(breakdown.score),
            lifecycle: LifecycleState::Candidate,
            flip: FlipState::Normal,
            confluence: confluence.tags,
            created_at: ctx.bars[formed_at_index].open_time,
            formed_at_index,
        };

        for outcome in &flips {
            apply_flip(&mut zone, outcome, self.config.flip.score_discount);
        }

        tracing::trace!(
            symbol = ctx.symbol,
            timeframe = %ctx.timeframe,
            zone = %zone.id,
            low,
            high,
            touches = breakdown.touches,
            reaction = breakdown.reaction,
            freshness = breakdown.freshness,
            confluence = breakdown.confluence,
            noise = breakdown.noise,
            score = breakdown.score,
            flips = flips.len(),
            "draft zone"
        );
        zone
    }
}
