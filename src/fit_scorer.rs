// =============================================================================
// fit_scorer.rs — DOES THIS LOAD FIT THE TRUCK?
// =============================================================================
//
// Four components, one hundred points:
//
//   rate       0-40   rate per mile against the carrier's floor
//   lane       0-30   origin and destination in preferred states
//   equipment  0-20   trailer type the carrier actually runs
//   distance   0-10   within the carrier's preferred haul length
//
// Every component that falls short of its maximum leaves a note in the
// reasons list, so dispatch can see at a glance why a load scored a 55.
// =============================================================================

use crate::models::{CompanyPreferences, ExtractedLoadSignal, LoadFitScore};

pub const RATE_MAX: f64 = 40.0;
pub const LANE_STATE_POINTS: f64 = 15.0;
pub const EQUIPMENT_MAX: f64 = 20.0;
pub const DISTANCE_MAX: f64 = 10.0;

const RATE_AT_FLOOR: f64 = 25.0;
const RATE_NEAR_FLOOR: f64 = 10.0;
const RATE_NEAR_FLOOR_MARGIN: f64 = 0.25;
const RATE_FULL_MARGIN: f64 = 1.0;
const DISTANCE_PARTIAL: f64 = 5.0;
const DISTANCE_STRETCH: f64 = 1.5;

fn rate_component(load: &ExtractedLoadSignal, prefs: &CompanyPreferences, reasons: &mut Vec<String>) -> f64 {
    let floor = prefs.min_rate_per_mile;
    let Some(rpm) = load.rate_per_mile else {
        reasons.push("Rate per mile unknown".to_string());
        return 0.0;
    };

    if rpm >= floor + RATE_FULL_MARGIN {
        RATE_MAX
    } else if rpm >= floor {
        // Linear between the floor (25) and floor + $1 (40).
        let points = RATE_AT_FLOOR + (rpm - floor) / RATE_FULL_MARGIN * (RATE_MAX - RATE_AT_FLOOR);
        reasons.push(format!(
            "Rate ${rpm:.2}/mi meets the ${floor:.2}/mi minimum but is under ${:.2}/mi",
            floor + RATE_FULL_MARGIN
        ));
        points
    } else if rpm >= floor - RATE_NEAR_FLOOR_MARGIN {
        reasons.push(format!("Rate ${rpm:.2}/mi slightly below ${floor:.2}/mi target"));
        RATE_NEAR_FLOOR
    } else {
        reasons.push(format!("Rate ${rpm:.2}/mi below ${floor:.2}/mi target"));
        0.0
    }
}

fn state_preferred(state: Option<&str>, prefs: &CompanyPreferences) -> bool {
    state.is_some_and(|s| {
        prefs
            .preferred_states
            .iter()
            .any(|preferred| preferred.eq_ignore_ascii_case(s))
    })
}

fn lane_component(load: &ExtractedLoadSignal, prefs: &CompanyPreferences, reasons: &mut Vec<String>) -> f64 {
    let mut points = 0.0;

    if state_preferred(load.origin_state.as_deref(), prefs) {
        points += LANE_STATE_POINTS;
    } else {
        reasons.push(match load.origin_state.as_deref() {
            Some(state) => format!("Origin {state} not in preferred states"),
            None => "Origin state unknown".to_string(),
        });
    }

    if state_preferred(load.dest_state.as_deref(), prefs) {
        points += LANE_STATE_POINTS;
    } else {
        reasons.push(match load.dest_state.as_deref() {
            Some(state) => format!("Destination {state} not in preferred states"),
            None => "Destination state unknown".to_string(),
        });
    }

    points
}

fn equipment_component(load: &ExtractedLoadSignal, prefs: &CompanyPreferences, reasons: &mut Vec<String>) -> f64 {
    let Some(equipment) = load.equipment.as_deref() else {
        reasons.push("Equipment type unknown".to_string());
        return 0.0;
    };

    let equipment_lower = equipment.to_lowercase();
    let matched = prefs.preferred_equipment.iter().any(|preferred| {
        let preferred = preferred.to_lowercase();
        !preferred.is_empty()
            && (equipment_lower.contains(&preferred) || preferred.contains(&equipment_lower))
    });

    if matched {
        EQUIPMENT_MAX
    } else {
        reasons.push(format!("Equipment {equipment} not preferred"));
        0.0
    }
}

fn distance_component(load: &ExtractedLoadSignal, prefs: &CompanyPreferences, reasons: &mut Vec<String>) -> f64 {
    let max = prefs.max_distance_miles;
    let Some(miles) = load.miles else {
        reasons.push("Distance unknown".to_string());
        return 0.0;
    };

    if miles <= max {
        DISTANCE_MAX
    } else if miles <= max * DISTANCE_STRETCH {
        reasons.push(format!("{miles:.0} miles exceeds {max:.0} mile preference"));
        DISTANCE_PARTIAL
    } else {
        reasons.push(format!("{miles:.0} miles far exceeds {max:.0} mile preference"));
        0.0
    }
}

/// Score a load against the carrier's preferences.
pub fn score(load: &ExtractedLoadSignal, prefs: &CompanyPreferences) -> LoadFitScore {
    let mut reasons = Vec::new();

    let total = rate_component(load, prefs, &mut reasons)
        + lane_component(load, prefs, &mut reasons)
        + equipment_component(load, prefs, &mut reasons)
        + distance_component(load, prefs, &mut reasons);

    let score = ((total * 100.0).round() / 100.0).clamp(0.0, 100.0);

    LoadFitScore { score, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn prefs() -> CompanyPreferences {
        CompanyPreferences {
            min_rate_per_mile: 2.00,
            preferred_states: BTreeSet::from(["TX".to_string(), "OK".to_string()]),
            preferred_equipment: BTreeSet::from(["Dry Van".to_string()]),
            max_distance_miles: 500.0,
            home_base: Some("Dallas, TX".to_string()),
        }
    }

    fn load(rpm: f64, miles: f64) -> ExtractedLoadSignal {
        ExtractedLoadSignal {
            origin_state: Some("TX".into()),
            dest_state: Some("OK".into()),
            rate_per_mile: Some(rpm),
            miles: Some(miles),
            equipment: Some("Dry Van".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_at_threshold_scores_85() {
        let fit = score(&load(2.00, 400.0), &prefs());
        assert_eq!(fit.score, 85.0);
        assert_eq!(fit.reasons.len(), 1);
        assert!(fit.reasons[0].contains("meets the $2.00/mi minimum"));
    }

    #[test]
    fn test_perfect_load_scores_100_with_no_reasons() {
        let fit = score(&load(3.10, 450.0), &prefs());
        assert_eq!(fit.score, 100.0);
        assert!(fit.reasons.is_empty());
    }

    #[test]
    fn test_rate_tiers() {
        assert_eq!(score(&load(2.50, 400.0), &prefs()).score, 32.5 + 60.0);
        assert_eq!(score(&load(1.80, 400.0), &prefs()).score, 10.0 + 60.0);
        assert_eq!(score(&load(1.50, 400.0), &prefs()).score, 60.0);
    }

    #[test]
    fn test_distance_tiers() {
        assert_eq!(score(&load(3.5, 700.0), &prefs()).score, 95.0);
        assert_eq!(score(&load(3.5, 800.0), &prefs()).score, 90.0);
    }

    #[test]
    fn test_empty_load_explains_every_component() {
        let fit = score(&ExtractedLoadSignal::default(), &prefs());
        assert_eq!(fit.score, 0.0);
        assert_eq!(fit.reasons.len(), 5);
        assert_eq!(fit.reasons[0], "Rate per mile unknown");
    }

    #[test]
    fn test_equipment_matches_case_insensitive_substring() {
        let mut reefer = load(3.5, 400.0);
        reefer.equipment = Some("Reefer".into());
        let mut p = prefs();
        p.preferred_equipment = BTreeSet::from(["reefer / dry van".to_string()]);
        assert_eq!(score(&reefer, &p).score, 100.0);
    }
}
