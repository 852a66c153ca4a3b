//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Clustering: well-separated groups come back whole, in any input order
//! 2. Selection: never more than the hard cap, never closer than the spacing
//! 3. Scoring: strength stays within [0, 100] for any inputs
//! 4. Geometry: draft bounds always sit inside the width bounds

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use zonelab_core::config::{QualityConfig, ScoringConfig, SelectorConfig, TimeframeConfig};
use zonelab_core::domain::{
    Bar, FlipState, LifecycleState, StrengthClass, Timeframe, Zone, ZoneId, ZoneKind,
};
use zonelab_core::pipeline::scoring::ScoreInputs;
use zonelab_core::pipeline::{
    cluster_points, score_zone, select_zones, Cluster, QualityFilter, SwingKind, SwingPoint,
    WidthBounds,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn point(price: f64, index: usize) -> SwingPoint {
    SwingPoint {
        price,
        index,
        kind: SwingKind::High,
    }
}

fn zone_at(mid: f64, strength: f64, lifecycle: LifecycleState) -> Zone {
    Zone {
        id: ZoneId(format!("1h-S-{mid:.6}")),
        symbol: "TEST".into(),
        timeframe: Timeframe::H1,
        kind: ZoneKind::Support,
        formed_as: ZoneKind::Support,
        low: mid - 0.05,
        mid,
        high: mid + 0.05,
        touch_count: 2,
        total_touches: 2,
        last_touch: None,
        reaction_median: 1.0,
        raw_strength: strength,
        strength,
        strength_class: StrengthClass::from_score(strength),
        lifecycle,
        flip: FlipState::Normal,
        confluence: BTreeSet::new(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        formed_at_index: 0,
    }
}

fn flat_bars(n: usize, close: f64) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| Bar {
            open_time: base + Duration::hours(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000.0,
        })
        .collect()
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// Groups of 2..6 points within ±0.4 of centres at least 10 apart.
fn arb_groups() -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-0.4..0.4_f64, 2..6), 1..6).prop_map(|groups| {
        groups
            .into_iter()
            .enumerate()
            .map(|(g, offsets)| {
                let centre = 100.0 + 10.0 * g as f64;
                offsets.into_iter().map(|o| centre + o).collect()
            })
            .collect()
    })
}

fn arb_lifecycle() -> impl Strategy<Value = LifecycleState> {
    prop_oneof![
        Just(LifecycleState::Candidate),
        Just(LifecycleState::Active),
        Just(LifecycleState::Key),
    ]
}

// ── 1. Clustering ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn separated_groups_cluster_whole(groups in arb_groups(), seed in any::<u64>()) {
        let mut points: Vec<SwingPoint> = groups
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, &p)| point(p, i))
            .collect();
        // deterministic shuffle so input order varies
        let n = points.len();
        for i in 0..n {
            let j = (seed.wrapping_mul(i as u64 + 1) % n as u64) as usize;
            points.swap(i, j);
        }

        let clusters = cluster_points(&points, 1.0, 2);
        prop_assert_eq!(clusters.len(), groups.len());
        for (cluster, group) in clusters.iter().zip(&groups) {
            prop_assert_eq!(cluster.len(), group.len());
        }

        // re-clustering a cluster's own members is a fixed point
        for cluster in &clusters {
            let again = cluster_points(&cluster.members, 1.0, 2);
            prop_assert_eq!(again.len(), 1);
            prop_assert_eq!(&again[0], cluster);
        }
    }
}

// ── 2. Selection ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn selection_respects_cap_and_spacing(
        specs in prop::collection::vec((90.0..110.0_f64, 0.0..100.0_f64, arb_lifecycle()), 0..40),
        vol in 0.2..2.0_f64,
    ) {
        let zones: Vec<Zone> = specs
            .iter()
            .map(|&(mid, strength, state)| zone_at(mid, strength, state))
            .collect();
        let tf = TimeframeConfig::defaults_for(Timeframe::H1);
        let out = select_zones(zones, vol, &tf, &SelectorConfig::default());

        prop_assert!(out.len() <= tf.hard_cap);
        let spacing = tf.min_spacing_atr * vol;
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                prop_assert!((a.mid - b.mid).abs() >= spacing);
            }
        }
        for pair in out.windows(2) {
            prop_assert!(pair[0].strength >= pair[1].strength);
        }
    }
}

// ── 3. Scoring ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn score_is_bounded(
        touches in 0usize..12,
        purity in 0.0..=1.0_f64,
        reaction in 0.0..6.0_f64,
        days in prop::option::of(0.0..400.0_f64),
        confluence in 0.0..=1.0_f64,
        half_width in 0.01..2.0_f64,
    ) {
        let bars = flat_bars(60, 100.0);
        let cfg = ScoringConfig::default();
        for (tau, mult) in [(7.0, 0.95), (40.0, 1.2)] {
            let breakdown = score_zone(
                &ScoreInputs {
                    bars: &bars,
                    low: 100.0 - half_width,
                    high: 100.0 + half_width,
                    valid_touches: touches,
                    purity,
                    median_reaction: reaction,
                    days_since_touch: days,
                    confluence,
                },
                &cfg,
                tau,
                mult,
            );
            prop_assert!((0.0..=100.0).contains(&breakdown.score));
        }
    }
}

// ── 4. Geometry ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn draft_bounds_stay_inside_width_bounds(
        centre in 10.0..1000.0_f64,
        spread in prop::collection::vec(-0.05..0.05_f64, 2..8),
        vol_frac in 0.001..0.05_f64,
        range_frac in 0.0..0.3_f64,
    ) {
        let vol = centre * vol_frac;
        let rolling_range = centre * range_frac;
        let tf = TimeframeConfig::defaults_for(Timeframe::H4);
        let quality = QualityConfig::default();
        let filter = QualityFilter {
            quality: &quality,
            guard: &tf.width,
            vol,
            rolling_range,
        };

        let cluster = Cluster::new(
            spread
                .iter()
                .enumerate()
                .map(|(i, s)| point(centre * (1.0 + s), i))
                .collect(),
        );
        let (low, mid, high) = filter.draft_bounds(&cluster);
        prop_assert!(low < mid && mid < high);

        let bounds = WidthBounds::compute(&tf.width, mid, vol, rolling_range);
        prop_assert!(bounds.min <= bounds.max);
        let width = high - low;
        prop_assert!(width >= bounds.min - 1e-9 * centre);
        prop_assert!(width <= bounds.max + 1e-9 * centre);
    }
}
