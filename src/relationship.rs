// =============================================================================
// relationship.rs — HOW IS IT GOING WITH THIS BROKER?
// =============================================================================
//
// A broker's stats are never patched in place. Every time a new load lands we
// take the broker's entire history and rebuild the aggregate from scratch.
// The input is sorted first, so the same history always produces the same
// bits no matter what order the store handed it back in.
//
// The relationship score is four stacked tiers:
//
//   volume       total loads          ≥50 → 40, ≥20 → 30, ≥10 → 20, else n
//   activity     loads this month     ≥10 → 30, ≥5 → 20, ≥2 → 10
//   rate         avg $/mi vs floor    ≥floor+0.50 → 20, ≥floor → 15, ≥floor-0.25 → 10
//   consistency  top lane share       × 10
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::models::{BrokerStats, LaneStat, LoadHistoryEntry};

pub const TOP_LANES: usize = 5;
const WEEK_DAYS: i64 = 7;
const MONTH_DAYS: i64 = 30;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// (minimum total loads, points), checked top-down.
const VOLUME_TIERS: &[(u32, f64)] = &[(50, 40.0), (20, 30.0), (10, 20.0)];
/// (minimum loads this month, points).
const ACTIVITY_TIERS: &[(u32, f64)] = &[(10, 30.0), (5, 20.0), (2, 10.0)];
/// (margin over the rate floor, points).
const RATE_TIERS: &[(f64, f64)] = &[(0.50, 20.0), (0.0, 15.0), (-0.25, 10.0)];
const CONSISTENCY_WEIGHT: f64 = 10.0;
const MAX_SCORE: f64 = 100.0;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn volume_points(total_loads: u32) -> f64 {
    VOLUME_TIERS
        .iter()
        .find(|(min, _)| total_loads >= *min)
        .map(|(_, points)| *points)
        .unwrap_or(total_loads as f64)
}

fn activity_points(loads_this_month: u32) -> f64 {
    ACTIVITY_TIERS
        .iter()
        .find(|(min, _)| loads_this_month >= *min)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

fn rate_points(avg_rate_per_mile: Option<f64>, min_rate_per_mile: f64) -> f64 {
    let Some(avg) = avg_rate_per_mile else {
        return 0.0;
    };
    RATE_TIERS
        .iter()
        .find(|(margin, _)| avg >= min_rate_per_mile + margin)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Relationship score in [0, 100].
pub fn relationship_score(
    total_loads: u32,
    loads_this_month: u32,
    avg_rate_per_mile: Option<f64>,
    lane_consistency: f64,
    min_rate_per_mile: f64,
) -> f64 {
    let raw = volume_points(total_loads)
        + activity_points(loads_this_month)
        + rate_points(avg_rate_per_mile, min_rate_per_mile)
        + lane_consistency.clamp(0.0, 1.0) * CONSISTENCY_WEIGHT;
    round2(raw.clamp(0.0, MAX_SCORE))
}

#[derive(Default)]
struct LaneAccumulator {
    count: u32,
    rate_sum: f64,
    rate_count: u32,
}

fn top_lanes(history: &[&LoadHistoryEntry]) -> (Vec<LaneStat>, u32) {
    let mut lanes: BTreeMap<String, LaneAccumulator> = BTreeMap::new();

    for entry in history {
        let Some((origin, dest)) = entry.lane_pair() else {
            continue;
        };
        let acc = lanes.entry(format!("{origin} → {dest}")).or_default();
        acc.count += 1;
        if let Some(rate) = entry.rate {
            acc.rate_sum += rate;
            acc.rate_count += 1;
        }
    }

    let lane_count = lanes.len() as u32;
    let mut ranked: Vec<LaneStat> = lanes
        .into_iter()
        .map(|(lane, acc)| LaneStat {
            lane,
            count: acc.count,
            avg_rate: (acc.rate_count > 0).then(|| round2(acc.rate_sum / acc.rate_count as f64)),
        })
        .collect();

    // BTreeMap order already sorts by label; a stable sort keeps that for ties.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_LANES);

    (ranked, lane_count)
}

/// Rebuild a broker's stats from its complete load history.
///
/// Returns `None` for an empty history: there is no first or last contact to
/// report. `as_of` anchors the week and month windows.
pub fn recompute(
    broker_key: &str,
    history: &[LoadHistoryEntry],
    as_of: DateTime<Utc>,
    min_rate_per_mile: f64,
) -> Option<BrokerStats> {
    let mut sorted: Vec<&LoadHistoryEntry> = history.iter().collect();
    sorted.sort_by(|a, b| {
        a.received_at
            .cmp(&b.received_at)
            .then_with(|| a.message_id.cmp(&b.message_id))
    });

    let first = sorted.first()?.received_at;
    let last = sorted.last()?.received_at;
    let total_loads = sorted.len() as u32;

    let week_cutoff = as_of - Duration::days(WEEK_DAYS);
    let month_cutoff = as_of - Duration::days(MONTH_DAYS);
    let loads_this_week = sorted.iter().filter(|e| e.received_at >= week_cutoff).count() as u32;
    let loads_this_month = sorted.iter().filter(|e| e.received_at >= month_cutoff).count() as u32;

    let rates: Vec<f64> = sorted.iter().filter_map(|e| e.rate_per_mile).collect();
    let avg_rate_per_mile =
        (!rates.is_empty()).then(|| round2(rates.iter().sum::<f64>() / rates.len() as f64));
    let highest_rate = rates.iter().copied().reduce(f64::max);
    let lowest_rate = rates.iter().copied().reduce(f64::min);

    let (top_lanes, lane_count) = top_lanes(&sorted);
    let lane_consistency = top_lanes
        .first()
        .map(|top| top.count as f64 / total_loads as f64)
        .unwrap_or(0.0);

    let avg_days_between_contacts = (total_loads > 1).then(|| {
        let span_days = (last - first).num_seconds() as f64 / SECONDS_PER_DAY;
        round2(span_days / (total_loads - 1) as f64)
    });

    let relationship_score = relationship_score(
        total_loads,
        loads_this_month,
        avg_rate_per_mile,
        lane_consistency,
        min_rate_per_mile,
    );

    Some(BrokerStats {
        broker_key: broker_key.to_string(),
        total_loads,
        loads_this_week,
        loads_this_month,
        avg_rate_per_mile,
        highest_rate,
        lowest_rate,
        top_lanes,
        lane_count,
        first_contact_at: first,
        last_contact_at: last,
        avg_days_between_contacts,
        relationship_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, days_ago: i64, lane: (&str, &str), rpm: Option<f64>) -> LoadHistoryEntry {
        LoadHistoryEntry {
            message_id: id.to_string(),
            received_at: as_of() - Duration::days(days_ago),
            origin_city: Some("Dallas".into()),
            origin_state: Some(lane.0.into()),
            dest_city: None,
            dest_state: Some(lane.1.into()),
            rate: rpm.map(|r| r * 500.0),
            rate_per_mile: rpm,
        }
    }

    fn history() -> Vec<LoadHistoryEntry> {
        vec![
            entry("m1", 40, ("TX", "GA"), Some(2.10)),
            entry("m2", 20, ("TX", "GA"), Some(2.50)),
            entry("m3", 10, ("TX", "OK"), None),
            entry("m4", 3, ("TX", "GA"), Some(2.90)),
            entry("m5", 1, ("TX", "AR"), Some(1.90)),
        ]
    }

    #[test]
    fn test_empty_history_has_no_stats() {
        assert!(recompute("TQL", &[], as_of(), 2.0).is_none());
    }

    #[test]
    fn test_counts_rates_and_lanes() {
        let stats = recompute("TQL", &history(), as_of(), 2.0).unwrap();
        assert_eq!(stats.total_loads, 5);
        assert_eq!(stats.loads_this_week, 2);
        assert_eq!(stats.loads_this_month, 4);
        assert_eq!(stats.avg_rate_per_mile, Some(2.35));
        assert_eq!(stats.highest_rate, Some(2.90));
        assert_eq!(stats.lowest_rate, Some(1.90));
        assert_eq!(stats.lane_count, 3);
        assert_eq!(stats.top_lanes[0].lane, "Dallas, TX → GA");
        assert_eq!(stats.top_lanes[0].count, 3);
        assert_eq!(stats.top_lanes[1].lane, "Dallas, TX → AR");
        assert_eq!(stats.avg_days_between_contacts, Some(9.75));
        // volume 5 + activity 10 + rate 15 + consistency 0.6 * 10
        assert_eq!(stats.relationship_score, 36.0);
    }

    #[test]
    fn test_recompute_is_idempotent_and_order_independent() {
        let forward = recompute("TQL", &history(), as_of(), 2.0).unwrap();
        let again = recompute("TQL", &history(), as_of(), 2.0).unwrap();
        let mut reversed_history = history();
        reversed_history.reverse();
        let reversed = recompute("TQL", &reversed_history, as_of(), 2.0).unwrap();
        assert_eq!(forward, again);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_single_load_has_no_contact_gap() {
        let stats = recompute("TQL", &history()[..1], as_of(), 2.0).unwrap();
        assert_eq!(stats.avg_days_between_contacts, None);
        assert_eq!(stats.first_contact_at, stats.last_contact_at);
    }

    #[test]
    fn test_score_monotone_in_total_loads_and_bounded() {
        let mut previous = f64::MIN;
        for total in 0..=120 {
            let score = relationship_score(total, 12, Some(3.0), 1.0, 2.0);
            assert!(score >= previous, "score dropped at {total}");
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
        assert_eq!(relationship_score(120, 12, Some(3.0), 1.0, 2.0), 100.0);
    }

    #[test]
    fn test_rate_tiers_against_floor() {
        assert_eq!(rate_points(Some(2.50), 2.0), 20.0);
        assert_eq!(rate_points(Some(2.00), 2.0), 15.0);
        assert_eq!(rate_points(Some(1.80), 2.0), 10.0);
        assert_eq!(rate_points(Some(1.70), 2.0), 0.0);
        assert_eq!(rate_points(None, 2.0), 0.0);
    }
}
