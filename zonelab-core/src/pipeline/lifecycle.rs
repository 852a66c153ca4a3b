//! Per-zone lifecycle: prune, decay, classify.
//!
//! Drafts are rebuilt from history every cycle; the records kept here are
//! the only memory between cycles. A draft inherits the record with the same
//! id, or failing that an unclaimed record of the same kind whose band
//! overlaps it. Records nobody claims are retired.
//!
//! Every decision is emitted as a `LifecycleEvent`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::confluence::TAG_HTF;
use super::cooldown::CooldownLedger;
use super::days_between;
use crate::config::{LifecycleConfig, TimeframeConfig};
use crate::domain::{
    price_bucket, LifecycleAction, LifecycleEvent, LifecycleState, Timeframe, Zone, ZoneId,
    ZoneKind,
};

/// What survives of a zone between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: ZoneId,
    /// Matched on the formation side, which flips never change.
    pub formed_as: ZoneKind,
    pub low: f64,
    pub high: f64,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct LifecycleManager<'a> {
    pub config: &'a LifecycleConfig,
    pub timeframe: Timeframe,
    pub tf_config: &'a TimeframeConfig,
}

impl LifecycleManager<'_> {
    /// Days since the last valid touch, or since the zone formed when it
    /// has none.
    pub fn evidence_age(&self, zone: &Zone, as_of: DateTime<Utc>) -> f64 {
        days_between(zone.last_touch.unwrap_or(zone.created_at), as_of)
    }

    pub fn is_stale(&self, age_days: f64) -> bool {
        age_days > self.tf_config.staleness_days
    }

    /// `raw · (1 − decay)^days` once more than a day has passed.
    pub fn decayed_strength(&self, raw: f64, age_days: f64) -> f64 {
        if age_days > 1.0 {
            raw * (1.0 - self.config.decay_per_day).powf(age_days)
        } else {
            raw
        }
    }

    /// State for the zone's current (decayed) strength and evidence.
    pub fn target_state(
        &self,
        zone: &Zone,
        previous: Option<LifecycleState>,
        age_days: f64,
    ) -> LifecycleState {
        let cfg = self.config;
        let score = zone.strength;
        let purity = zone.purity();

        if score < cfg.demote_score || purity < cfg.demote_purity {
            return LifecycleState::Candidate;
        }
        let htf = zone.confluence.contains(TAG_HTF);
        if score >= cfg.key_score && (htf || zone.touch_count >= cfg.key_min_touches) {
            return LifecycleState::Key;
        }

        let was_active = previous.is_some_and(|s| s >= LifecycleState::Active);
        let floor = if was_active {
            cfg.demote_score
        } else {
            cfg.active_promote_score
        };
        let half_stale = age_days > self.tf_config.staleness_days / 2.0;
        if zone.touch_count >= cfg.active_min_touches
            && purity >= cfg.active_min_purity
            && !half_stale
            && score >= floor
        {
            LifecycleState::Active
        } else {
            LifecycleState::Candidate
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn event(
        &self,
        zone_id: &ZoneId,
        symbol: &str,
        action: LifecycleAction,
        from: Option<LifecycleState>,
        to: Option<LifecycleState>,
        strength: f64,
        at: DateTime<Utc>,
        reason: String,
    ) -> LifecycleEvent {
        tracing::info!(
            symbol,
            timeframe = %self.timeframe,
            zone = %zone_id,
            action = ?action,
            from = ?from,
            to = ?to,
            strength,
            %reason,
            "zone lifecycle"
        );
        LifecycleEvent {
            zone_id: zone_id.clone(),
            symbol: symbol.to_string(),
            timeframe: self.timeframe,
            action,
            from,
            to,
            strength,
            at,
            reason,
        }
    }

    /// Run one cycle over this timeframe's drafts.
    ///
    /// Returns the live zones (state assigned, strength decayed) and the
    /// lifecycle events in decision order.
    pub fn run(
        &self,
        symbol: &str,
        mut drafts: Vec<Zone>,
        records: &mut BTreeMap<ZoneId, ZoneRecord>,
        ledger: &mut CooldownLedger,
        as_of: DateTime<Utc>,
    ) -> (Vec<Zone>, Vec<LifecycleEvent>) {
        let mut events = Vec::new();
        ledger.purge_expired(as_of);

        // Unique draft ids, then claim records by id, then by geometry.
        let mut seen = BTreeSet::new();
        for draft in &mut drafts {
            let base = draft.id.clone();
            let mut ordinal = 1;
            while !seen.insert(draft.id.clone()) {
                draft.id = base.with_suffix(ordinal);
                ordinal += 1;
            }
        }
        let mut claimed: BTreeSet<ZoneId> = BTreeSet::new();
        let mut matched: Vec<Option<ZoneId>> = drafts
            .iter()
            .map(|d| {
                records.contains_key(&d.id).then(|| {
                    claimed.insert(d.id.clone());
                    d.id.clone()
                })
            })
            .collect();
        for (draft, slot) in drafts.iter().zip(matched.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            let hit = records.values().find(|r| {
                !claimed.contains(&r.id)
                    && r.formed_as == draft.formed_as
                    && draft.overlaps(r.low, r.high)
            });
            if let Some(record) = hit {
                claimed.insert(record.id.clone());
                *slot = Some(record.id.clone());
            }
        }
        let mut used = claimed.clone();

        let mut live = Vec::with_capacity(drafts.len());
        let mut dropped_unseen = 0usize;
        for (mut zone, slot) in drafts.into_iter().zip(matched) {
            let previous = match &slot {
                Some(id) => {
                    zone.id = id.clone();
                    records.get(id).map(|r| {
                        zone.created_at = r.created_at;
                        r.state
                    })
                }
                None => {
                    let base = zone.id.clone();
                    let mut ordinal = 1;
                    while used.contains(&zone.id) {
                        zone.id = base.with_suffix(ordinal);
                        ordinal += 1;
                    }
                    None
                }
            };

            let bucket = price_bucket(zone.mid, self.config.id_bucket_pct);
            if previous.is_none() {
                if let Some(entry) = ledger.blocking(self.timeframe, zone.kind, bucket, as_of) {
                    if !entry.reported {
                        entry.reported = true;
                        let reason = format!("cooling down until {}", entry.expires_at);
                        events.push(self.event(
                            &zone.id,
                            symbol,
                            LifecycleAction::Blocked,
                            None,
                            None,
                            zone.raw_strength,
                            as_of,
                            reason,
                        ));
                    }
                    continue;
                }
            }

            let age = self.evidence_age(&zone, as_of);
            if self.is_stale(age) {
                match previous {
                    Some(prev) => {
                        let expires_at = as_of
                            + self.timeframe.duration() * self.tf_config.cooldown_bars as i32;
                        ledger.record(zone.id.clone(), self.timeframe, zone.kind, bucket, expires_at);
                        records.remove(&zone.id);
                        let reason = format!(
                            "no valid touch for {age:.1} days (limit {})",
                            self.tf_config.staleness_days
                        );
                        events.push(self.event(
                            &zone.id,
                            symbol,
                            LifecycleAction::Pruned,
                            Some(prev),
                            None,
                            zone.raw_strength,
                            as_of,
                            reason,
                        ));
                    }
                    None => dropped_unseen += 1,
                }
                continue;
            }

            zone.set_strength(self.decayed_strength(zone.raw_strength, age));
            let state = self.target_state(&zone, previous, age);
            zone.lifecycle = state;
            let reason = format!(
                "strength {:.1}, {} valid of {} touches, purity {:.2}",
                zone.strength,
                zone.touch_count,
                zone.total_touches,
                zone.purity()
            );
            match previous {
                None => events.push(self.event(
                    &zone.id,
                    symbol,
                    LifecycleAction::Created,
                    None,
                    Some(state),
                    zone.strength,
                    as_of,
                    reason,
                )),
                Some(prev) if state > prev => events.push(self.event(
                    &zone.id,
                    symbol,
                    LifecycleAction::Promoted,
                    Some(prev),
                    Some(state),
                    zone.strength,
                    as_of,
                    reason,
                )),
                Some(prev) if state < prev => events.push(self.event(
                    &zone.id,
                    symbol,
                    LifecycleAction::Demoted,
                    Some(prev),
                    Some(state),
                    zone.strength,
                    as_of,
                    reason,
                )),
                Some(_) => {}
            }

            used.insert(zone.id.clone());
            records.insert(
                zone.id.clone(),
                ZoneRecord {
                    id: zone.id.clone(),
                    formed_as: zone.formed_as,
                    low: zone.low,
                    high: zone.high,
                    state,
                    created_at: zone.created_at,
                    updated_at: as_of,
                },
            );
            live.push(zone);
        }

        if dropped_unseen > 0 {
            tracing::debug!(
                symbol,
                timeframe = %self.timeframe,
                count = dropped_unseen,
                "skipped stale drafts that were never live"
            );
        }

        let vanished: Vec<ZoneId> = records
            .keys()
            .filter(|id| !claimed.contains(*id) && !live.iter().any(|z| &z.id == *id))
            .cloned()
            .collect();
        for id in vanished {
            if let Some(record) = records.remove(&id) {
                events.push(self.event(
                    &id,
                    symbol,
                    LifecycleAction::Retired,
                    Some(record.state),
                    None,
                    0.0,
                    as_of,
                    "no longer detected".to_string(),
                ));
            }
        }

        (live, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::{t0, zone};
    use chrono::Duration;

    struct Fixture {
        lifecycle: LifecycleConfig,
        tf: TimeframeConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                lifecycle: LifecycleConfig::default(),
                tf: TimeframeConfig::defaults_for(Timeframe::H1),
            }
        }

        fn manager(&self) -> LifecycleManager<'_> {
            LifecycleManager {
                config: &self.lifecycle,
                timeframe: Timeframe::H1,
                tf_config: &self.tf,
            }
        }
    }

    /// A zone touched validly at `as_of`, so no decay applies.
    fn fresh(strength: f64, valid: usize, total: usize, as_of: DateTime<Utc>) -> Zone {
        let mut z = zone(ZoneKind::Support, 99.5, 100.5, strength);
        z.touch_count = valid;
        z.total_touches = total;
        z.last_touch = Some(as_of);
        z.created_at = as_of - Duration::days(2);
        z
    }

    #[test]
    fn oscillating_score_does_not_flap_into_active() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let mut records = BTreeMap::new();
        let mut ledger = CooldownLedger::new(16);
        for cycle in 0..8 {
            let as_of = t0() + Duration::hours(cycle);
            let strength = if cycle % 2 == 0 { 49.0 } else { 51.0 };
            let (live, _) = mgr.run("TEST", vec![fresh(strength, 3, 3, as_of)], &mut records, &mut ledger, as_of);
            assert_eq!(live[0].lifecycle, LifecycleState::Candidate, "cycle {cycle}");
        }
    }

    #[test]
    fn active_zone_holds_above_demote_threshold() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let mut records = BTreeMap::new();
        let mut ledger = CooldownLedger::new(16);
        let (live, events) = mgr.run("TEST", vec![fresh(60.0, 3, 3, t0())], &mut records, &mut ledger, t0());
        assert_eq!(live[0].lifecycle, LifecycleState::Active);
        assert_eq!(events[0].action, LifecycleAction::Created);

        let later = t0() + Duration::hours(1);
        let (live, events) = mgr.run("TEST", vec![fresh(52.0, 3, 3, later)], &mut records, &mut ledger, later);
        assert_eq!(live[0].lifecycle, LifecycleState::Active);
        assert!(events.is_empty());

        let (live, events) = mgr.run("TEST", vec![fresh(49.0, 3, 3, later)], &mut records, &mut ledger, later);
        assert_eq!(live[0].lifecycle, LifecycleState::Candidate);
        assert_eq!(events[0].action, LifecycleAction::Demoted);
    }

    #[test]
    fn key_needs_htf_or_three_touches() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let two = fresh(85.0, 2, 2, t0());
        assert_eq!(mgr.target_state(&two, None, 0.0), LifecycleState::Active);
        let mut htf = two.clone();
        htf.confluence.insert(TAG_HTF.to_string());
        assert_eq!(mgr.target_state(&htf, None, 0.0), LifecycleState::Key);
        let three = fresh(85.0, 3, 3, t0());
        assert_eq!(mgr.target_state(&three, None, 0.0), LifecycleState::Key);
    }

    #[test]
    fn low_purity_forces_candidate() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let z = fresh(90.0, 3, 6, t0());
        assert_eq!(mgr.target_state(&z, Some(LifecycleState::Key), 0.0), LifecycleState::Candidate);
    }

    #[test]
    fn decay_applies_after_one_day() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        assert_eq!(mgr.decayed_strength(60.0, 0.5), 60.0);
        let decayed = mgr.decayed_strength(60.0, 2.0);
        assert!((decayed - 60.0 * 0.95f64.powi(2)).abs() < 1e-9);
    }

    #[test]
    fn stale_zone_is_pruned_and_blocked() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let mut records = BTreeMap::new();
        let mut ledger = CooldownLedger::new(16);
        let z = fresh(60.0, 3, 3, t0());
        mgr.run("TEST", vec![z.clone()], &mut records, &mut ledger, t0());
        assert_eq!(records.len(), 1);

        // 8 days later with no new touch: past the 7-day 1h staleness window
        let later = t0() + Duration::days(8);
        let (live, events) = mgr.run("TEST", vec![z.clone()], &mut records, &mut ledger, later);
        assert!(live.is_empty());
        assert_eq!(events[0].action, LifecycleAction::Pruned);
        assert!(records.is_empty());
        assert_eq!(ledger.len(), 1);

        // a fresh draft at the same level is blocked once, then silently
        let again = fresh(70.0, 3, 3, later);
        let (live, events) = mgr.run("TEST", vec![again.clone()], &mut records, &mut ledger, later);
        assert!(live.is_empty());
        assert_eq!(events[0].action, LifecycleAction::Blocked);
        let (_, events) = mgr.run("TEST", vec![again.clone()], &mut records, &mut ledger, later);
        assert!(events.is_empty());

        // 20 one-hour bars later the block has expired
        let expired = later + Duration::hours(20);
        let mut revived = again;
        revived.last_touch = Some(expired);
        let (live, events) = mgr.run("TEST", vec![revived], &mut records, &mut ledger, expired);
        assert_eq!(live.len(), 1);
        assert_eq!(events[0].action, LifecycleAction::Created);
    }

    #[test]
    fn vanished_zone_is_retired() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let mut records = BTreeMap::new();
        let mut ledger = CooldownLedger::new(16);
        mgr.run("TEST", vec![fresh(60.0, 3, 3, t0())], &mut records, &mut ledger, t0());
        let (_, events) = mgr.run("TEST", Vec::new(), &mut records, &mut ledger, t0());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, LifecycleAction::Retired);
        assert!(ledger.is_empty());
    }

    #[test]
    fn drifted_zone_keeps_its_id() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let mut records = BTreeMap::new();
        let mut ledger = CooldownLedger::new(16);
        let first = fresh(60.0, 3, 3, t0());
        let original_id = first.id.clone();
        mgr.run("TEST", vec![first], &mut records, &mut ledger, t0());

        let mut drifted = fresh(60.0, 3, 3, t0());
        drifted.id = ZoneId("1h-S-other".into());
        drifted.low += 0.3;
        drifted.high += 0.3;
        let (live, events) = mgr.run("TEST", vec![drifted], &mut records, &mut ledger, t0());
        assert_eq!(live[0].id, original_id);
        assert!(events.is_empty());
    }

    #[test]
    fn duplicate_draft_ids_get_suffixes() {
        let fx = Fixture::new();
        let mgr = fx.manager();
        let mut records = BTreeMap::new();
        let mut ledger = CooldownLedger::new(16);
        let a = fresh(60.0, 3, 3, t0());
        let mut b = a.clone();
        b.low += 5.0;
        b.high += 5.0;
        let (live, _) = mgr.run("TEST", vec![a, b], &mut records, &mut ledger, t0());
        assert_ne!(live[0].id, live[1].id);
        assert!(live[1].id.as_str().ends_with(".1"));
    }
}
