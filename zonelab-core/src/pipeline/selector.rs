//! Bounded, well-spaced zone selection for one timeframe.
//!
//! Stages, in order: class quota, per-bucket cap, greedy minimum spacing,
//! prominence truncation. Output is sorted by strength (descending), ties
//! broken by ascending mid.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::{SelectorConfig, TimeframeConfig};
use crate::domain::{LifecycleState, Zone};

fn by_strength(a: &Zone, b: &Zone) -> Ordering {
    b.strength
        .total_cmp(&a.strength)
        .then(a.mid.total_cmp(&b.mid))
        .then(a.id.cmp(&b.id))
}

/// Composite rank used when spacing alone leaves too many zones.
pub fn prominence(zone: &Zone) -> f64 {
    let state_bonus = match zone.lifecycle {
        LifecycleState::Key => 1.0,
        LifecycleState::Active => 0.5,
        LifecycleState::Candidate => 0.0,
    };
    0.3 * (zone.touch_count as f64 / 5.0).min(1.0)
        + 0.3 * (zone.reaction_median / 2.0).clamp(0.0, 1.0)
        + 0.3 * zone.strength / 100.0
        + 0.1 * state_bonus
}

pub fn select_zones(
    mut zones: Vec<Zone>,
    vol: f64,
    tf: &TimeframeConfig,
    cfg: &SelectorConfig,
) -> Vec<Zone> {
    let vol = if vol.is_finite() && vol > 0.0 {
        vol
    } else {
        f64::MIN_POSITIVE
    };
    let cap = tf.hard_cap;

    // (a) every key and active zone, candidates up to the cap
    zones.sort_by(|a, b| b.lifecycle.cmp(&a.lifecycle).then_with(|| by_strength(a, b)));
    let mut quota = Vec::with_capacity(zones.len().min(cap));
    for zone in zones {
        if zone.lifecycle > LifecycleState::Candidate || quota.len() < cap {
            quota.push(zone);
        }
    }

    // (b) at most `max_per_bucket` per price bucket
    quota.sort_by(by_strength);
    let bucket_width = cfg.bucket_atr * vol;
    let mut per_bucket: BTreeMap<i64, usize> = BTreeMap::new();
    let bucketed: Vec<Zone> = quota
        .into_iter()
        .filter(|z| {
            let count = per_bucket
                .entry((z.mid / bucket_width).floor() as i64)
                .or_insert(0);
            *count += 1;
            *count <= cfg.max_per_bucket
        })
        .collect();

    // (c) greedy spacing, strongest first
    let spacing = tf.min_spacing_atr * vol;
    let mut kept: Vec<Zone> = Vec::with_capacity(bucketed.len());
    for zone in bucketed {
        if kept.iter().all(|k| (k.mid - zone.mid).abs() >= spacing) {
            kept.push(zone);
        }
    }

    // (d) prominence truncation
    if kept.len() > cap {
        kept.sort_by(|a, b| {
            prominence(b)
                .total_cmp(&prominence(a))
                .then_with(|| by_strength(a, b))
        });
        kept.truncate(cap);
    }

    kept.sort_by(by_strength);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Timeframe, ZoneKind};
    use crate::pipeline::testutil::zone;

    fn tf_cfg(cap: usize, spacing: f64) -> TimeframeConfig {
        let mut cfg = TimeframeConfig::defaults_for(Timeframe::M15);
        cfg.hard_cap = cap;
        cfg.min_spacing_atr = spacing;
        cfg
    }

    fn at(mid: f64, strength: f64, state: LifecycleState) -> Zone {
        let mut z = zone(ZoneKind::Support, mid - 0.1, mid + 0.1, strength);
        z.lifecycle = state;
        z
    }

    #[test]
    fn output_is_sorted_by_strength_then_mid() {
        let zones = vec![
            at(110.0, 50.0, LifecycleState::Candidate),
            at(100.0, 70.0, LifecycleState::Candidate),
            at(105.0, 50.0, LifecycleState::Candidate),
        ];
        let out = select_zones(zones, 1.0, &tf_cfg(15, 0.4), &SelectorConfig::default());
        let mids: Vec<f64> = out.iter().map(|z| z.mid).collect();
        assert_eq!(mids, vec![100.0, 105.0, 110.0]);
    }

    #[test]
    fn key_and_active_bypass_the_quota() {
        let mut zones = vec![
            at(100.0, 40.0, LifecycleState::Active),
            at(110.0, 30.0, LifecycleState::Key),
        ];
        zones.push(at(120.0, 90.0, LifecycleState::Candidate));
        let out = select_zones(zones, 1.0, &tf_cfg(2, 0.4), &SelectorConfig::default());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|z| z.lifecycle > LifecycleState::Candidate));
    }

    #[test]
    fn bucket_keeps_two_strongest() {
        let zones = vec![
            at(100.05, 60.0, LifecycleState::Candidate),
            at(100.5, 70.0, LifecycleState::Candidate),
            at(100.95, 50.0, LifecycleState::Candidate),
        ];
        // bucket width 1.0, spacing disabled
        let out = select_zones(zones, 1.0, &tf_cfg(15, 0.0), &SelectorConfig::default());
        let strengths: Vec<f64> = out.iter().map(|z| z.strength).collect();
        assert_eq!(strengths, vec![70.0, 60.0]);
    }

    #[test]
    fn spacing_rejects_weaker_neighbour() {
        let zones = vec![
            at(100.0, 80.0, LifecycleState::Candidate),
            at(100.3, 90.0, LifecycleState::Candidate),
            at(101.5, 40.0, LifecycleState::Candidate),
        ];
        let out = select_zones(zones, 1.0, &tf_cfg(15, 0.4), &SelectorConfig::default());
        let mids: Vec<f64> = out.iter().map(|z| z.mid).collect();
        assert_eq!(mids, vec![100.3, 101.5]);
    }

    #[test]
    fn prominence_truncates_excess_key_zones() {
        let zones: Vec<Zone> = (0..5)
            .map(|i| {
                let mut z = at(100.0 + 2.0 * i as f64, 80.0 + i as f64, LifecycleState::Key);
                z.touch_count = 5;
                z
            })
            .collect();
        let out = select_zones(zones, 1.0, &tf_cfg(3, 0.4), &SelectorConfig::default());
        assert_eq!(out.len(), 3);
        let strengths: Vec<f64> = out.iter().map(|z| z.strength).collect();
        assert_eq!(strengths, vec![84.0, 83.0, 82.0]);
    }

    #[test]
    fn prominence_blend() {
        let mut z = at(100.0, 50.0, LifecycleState::Active);
        z.touch_count = 10;
        z.reaction_median = 1.0;
        // 0.3·1 + 0.3·0.5 + 0.3·0.5 + 0.1·0.5
        assert!((prominence(&z) - 0.65).abs() < 1e-12);
    }
}
