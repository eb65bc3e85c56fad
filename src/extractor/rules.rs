// =============================================================================
// extractor/rules.rs — THE RULE TABLES
// =============================================================================
//
// Every field is an ordered list of (pattern, validator) rules. The first
// rule that produces a value its validator accepts wins, and nothing after it
// is tried. Rules are data: add one to the list, write a test for it, done.
//
// The validators are where precision comes from. A "$45" in a rate email is
// a lumper fee, not the linehaul; "12 miles" is the distance to the truck
// stop. Out-of-range values are dropped, never clamped.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;

use crate::vocab;

/// A numeric field rule: first capture group, commas stripped, scaled, range-checked.
pub struct NumericRule {
    pub name: &'static str,
    pattern: Regex,
    scale: f64,
    pub min: f64,
    pub max: f64,
}

impl NumericRule {
    fn new(name: &'static str, pattern: &str, min: f64, max: f64) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("numeric rule pattern"),
            scale: 1.0,
            min,
            max,
        }
    }

    fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// First capture of this rule that parses and lands inside the range.
    pub fn first_accepted(&self, text: &str) -> Option<f64> {
        self.pattern.captures_iter(text).find_map(|caps| {
            let value = parse_number(caps.get(1)?.as_str())? * self.scale;
            (self.min..=self.max).contains(&value).then_some(value)
        })
    }
}

/// "1,500.00" -> 1500.0. Trailing separators from greedy captures are ignored.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim_end_matches([',', '.'])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Walk the rule list; first accepted value wins.
pub fn first_numeric(rules: &[NumericRule], text: &str) -> Option<(f64, &'static str)> {
    rules
        .iter()
        .find_map(|rule| rule.first_accepted(text).map(|v| (v, rule.name)))
}

pub const RATE_MIN: f64 = 300.0;
pub const RATE_MAX: f64 = 15_000.0;
pub const MILES_MIN: f64 = 50.0;
pub const MILES_MAX: f64 = 3_500.0;
pub const WEIGHT_MAX: f64 = 50_000.0;
pub const WEIGHT_MIN_LENIENT: f64 = 100.0;
pub const WEIGHT_MIN_STRICT: f64 = 1_000.0;

pub static RATE_RULES: LazyLock<Vec<NumericRule>> = LazyLock::new(|| {
    vec![
        NumericRule::new(
            "labeled_rate",
            r"(?i)\b(?:target\s+rate|all[\s-]?in(?:\s+rate)?|rate|pay(?:s|ing)?|offer(?:ing)?)\b\s*(?:is|of|:|=|-)?\s*\$\s*(\d[\d,]*(?:\.\d{1,2})?)",
            RATE_MIN,
            RATE_MAX,
        ),
        NumericRule::new(
            "dollar_amount",
            r"\$\s*(\d[\d,]*(?:\.\d{1,2})?)",
            RATE_MIN,
            RATE_MAX,
        ),
    ]
});

pub static MILES_RULES: LazyLock<Vec<NumericRule>> = LazyLock::new(|| {
    vec![
        NumericRule::new(
            "number_then_miles",
            r"(?i)\b(\d[\d,]*)\s*(?:loaded\s+)?(?:miles?|mi)\b",
            MILES_MIN,
            MILES_MAX,
        ),
        NumericRule::new(
            "labeled_miles",
            r"(?i)\b(?:loaded\s+miles|miles|mileage|distance)\s*[:=\-]?\s*(\d[\d,]*)",
            MILES_MIN,
            MILES_MAX,
        ),
    ]
});

fn weight_rules(min: f64) -> Vec<NumericRule> {
    vec![
        NumericRule::new(
            "labeled_weight",
            r"(?i)\b(?:weight|wgt|wt)\.?\s*[:=\-]?\s*(\d[\d,]*)\s*(?:lbs?|pounds|#)?",
            min,
            WEIGHT_MAX,
        ),
        NumericRule::new(
            "number_then_lbs",
            r"(?i)\b(\d[\d,]*)\s*(?:lbs?|pounds)\b",
            min,
            WEIGHT_MAX,
        ),
        NumericRule::new(
            "thousands_then_lbs",
            r"(?i)\b(\d{1,2}(?:\.\d)?)\s*k\s*(?:lbs?|pounds)\b",
            min,
            WEIGHT_MAX,
        )
        .scaled(1_000.0),
    ]
}

pub static WEIGHT_RULES_STRICT: LazyLock<Vec<NumericRule>> =
    LazyLock::new(|| weight_rules(WEIGHT_MIN_STRICT));

pub static WEIGHT_RULES_LENIENT: LazyLock<Vec<NumericRule>> =
    LazyLock::new(|| weight_rules(WEIGHT_MIN_LENIENT));

/// A code-shaped field rule (load numbers): capture group 1, then a validator.
pub struct CodeRule {
    pub name: &'static str,
    pattern: Regex,
    validate: fn(&str) -> bool,
}

impl CodeRule {
    fn new(name: &'static str, pattern: &str, validate: fn(&str) -> bool) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("code rule pattern"),
            validate,
        }
    }

    pub fn first_accepted(&self, text: &str) -> Option<String> {
        self.pattern.captures_iter(text).find_map(|caps| {
            let code = caps.get(1)?.as_str().trim_end_matches('-');
            (self.validate)(code).then(|| code.to_string())
        })
    }
}

fn plausible_code(code: &str) -> bool {
    (4..=20).contains(&code.len()) && code.chars().any(|c| c.is_ascii_digit())
}

fn bare_number(code: &str) -> bool {
    (5..=20).contains(&code.len())
}

pub static LOAD_NUMBER_RULES: LazyLock<Vec<CodeRule>> = LazyLock::new(|| {
    vec![
        CodeRule::new(
            "labeled_hash",
            r"(?i)\b(?:load|ref(?:erence)?|order|pro|shipment)\s*#\s*:?\s*([A-Z0-9][A-Z0-9-]{3,19})\b",
            plausible_code,
        ),
        CodeRule::new("bare_hash", r"#\s?(\d{5,20})\b", bare_number),
        CodeRule::new(
            "labeled_code",
            r"(?i)\b(?:load|ref(?:erence)?|order)\s*(?:id|number|num|no\.?)?\s*:\s*([A-Z0-9][A-Z0-9-]{3,19})\b",
            plausible_code,
        ),
    ]
});

pub fn first_code(rules: &[CodeRule], text: &str) -> Option<(String, &'static str)> {
    rules
        .iter()
        .find_map(|rule| rule.first_accepted(text).map(|v| (v, rule.name)))
}

/// An accepted lane. Cities are optional; both states are valid US codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lane {
    pub origin_city: Option<String>,
    pub origin_state: String,
    pub dest_city: Option<String>,
    pub dest_state: String,
}

impl Lane {
    fn build(
        origin_city: Option<&str>,
        origin_state: &str,
        dest_city: Option<&str>,
        dest_state: &str,
    ) -> Option<Self> {
        if !vocab::is_us_state(origin_state) || !vocab::is_us_state(dest_state) {
            return None;
        }
        Some(Self {
            origin_city: origin_city.and_then(clean_city),
            origin_state: origin_state.to_ascii_uppercase(),
            dest_city: dest_city.and_then(clean_city),
            dest_state: dest_state.to_ascii_uppercase(),
        })
    }
}

/// Words that sit in front of a city name without being part of it.
const LEADING_NOISE: &[&str] = &[
    "lane", "from", "load", "loads", "origin", "pickup", "pu", "shipper", "available", "new",
    "hot", "ready", "dry", "van", "reefer", "flatbed", "re", "fw", "fwd", "in", "out",
];

fn clean_city(raw: &str) -> Option<String> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while words.len() > 1
        && LEADING_NOISE
            .iter()
            .any(|noise| noise.eq_ignore_ascii_case(words[0].trim_end_matches(':')))
    {
        words.remove(0);
    }
    let city = words.join(" ");
    let city = city.trim_matches(|c: char| !c.is_alphanumeric() && c != '.');
    if city.is_empty() {
        return None;
    }
    let has_lower = city.chars().any(|c| c.is_lowercase());
    Some(if has_lower {
        city.to_string()
    } else {
        vocab::title_case(city)
    })
}

static CITY_STATE_LANE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<oc>[A-Z][A-Za-z.'-]*(?: [A-Z][A-Za-z.'-]*){0,3}),\s*(?P<os>[A-Za-z]{2})\b(?:\s+\d{5})?",
        r"(?:\s+(?:to|TO|To)\s+|\s*(?:->|→|=>|>|–|—|-)\s*)",
        r"(?P<dc>[A-Z][A-Za-z.'-]*(?: [A-Z][A-Za-z.'-]*){0,3}),\s*(?P<ds>[A-Za-z]{2})\b",
    ))
    .expect("city/state lane pattern")
});

// Labels are case-insensitive, state codes are not: "Pickup: in Dallas"
// must not read as Indiana.
static LABELED_ORIGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:origin|pick\s*-?\s*up|shipper)\s*(?:location|city)?\s*:\s*(?:(?P<city>[A-Za-z][A-Za-z.' -]*?),\s*)?(?-i:(?P<state>[A-Z]{2}))\b",
    )
    .expect("origin pattern")
});

static LABELED_DEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:destination|dest|delivery|consignee|drop(?:\s*-?\s*off)?)\s*(?:location|city)?\s*:\s*(?:(?P<city>[A-Za-z][A-Za-z.' -]*?),\s*)?(?-i:(?P<state>[A-Z]{2}))\b",
    )
    .expect("destination pattern")
});

static BARE_STATE_LANE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<os>[A-Z]{2})(?:\s+(?:to|TO)\s+|\s*(?:->|→|=>|>|–|—|-)\s*)(?P<ds>[A-Z]{2})\b")
        .expect("bare state lane pattern")
});

fn city_state_lane(text: &str) -> Option<Lane> {
    CITY_STATE_LANE.captures_iter(text).find_map(|caps| {
        Lane::build(
            caps.name("oc").map(|m| m.as_str()),
            caps.name("os")?.as_str(),
            caps.name("dc").map(|m| m.as_str()),
            caps.name("ds")?.as_str(),
        )
    })
}

fn first_labeled_endpoint(pattern: &Regex, text: &str) -> Option<(Option<String>, String)> {
    pattern.captures_iter(text).find_map(|caps| {
        let state = caps.name("state")?.as_str();
        vocab::is_us_state(state).then(|| {
            (
                caps.name("city").map(|m| m.as_str().to_string()),
                state.to_string(),
            )
        })
    })
}

fn labeled_lane(text: &str) -> Option<Lane> {
    let (origin_city, origin_state) = first_labeled_endpoint(&LABELED_ORIGIN, text)?;
    let (dest_city, dest_state) = first_labeled_endpoint(&LABELED_DEST, text)?;
    Lane::build(
        origin_city.as_deref(),
        &origin_state,
        dest_city.as_deref(),
        &dest_state,
    )
}

fn bare_state_lane(text: &str) -> Option<Lane> {
    BARE_STATE_LANE.captures_iter(text).find_map(|caps| {
        Lane::build(None, caps.name("os")?.as_str(), None, caps.name("ds")?.as_str())
    })
}

pub type LaneRule = fn(&str) -> Option<Lane>;

pub const LANE_RULES: &[(&str, LaneRule)] = &[
    ("city_state_pair", city_state_lane),
    ("labeled_origin_destination", labeled_lane),
    ("bare_state_pair", bare_state_lane),
];

pub fn first_lane(text: &str) -> Option<(Lane, &'static str)> {
    LANE_RULES
        .iter()
        .find_map(|(name, rule)| rule(text).map(|lane| (lane, *name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,500"), Some(1500.0));
        assert_eq!(parse_number("2,100.50"), Some(2100.5));
        assert_eq!(parse_number("1,500,"), Some(1500.0));
        assert_eq!(parse_number(","), None);
    }

    #[test]
    fn test_labeled_rate_beats_earlier_dollar_amount() {
        let text = "Lumper $45 reimbursed. Rate: $2,350 all in";
        assert_eq!(first_numeric(&RATE_RULES, text), Some((2350.0, "labeled_rate")));
    }

    #[test]
    fn test_out_of_range_rates_are_skipped_not_clamped() {
        assert_eq!(first_numeric(&RATE_RULES, "detention $50/hr, $2.75/mi"), None);
        assert_eq!(first_numeric(&RATE_RULES, "$75 fee then $1,900"), Some((1900.0, "dollar_amount")));
        assert_eq!(first_numeric(&RATE_RULES, "$25,000 cargo insurance"), None);
    }

    #[test]
    fn test_miles_rules() {
        assert_eq!(first_numeric(&MILES_RULES, "approx 1,210 loaded miles"), Some((1210.0, "number_then_miles")));
        assert_eq!(first_numeric(&MILES_RULES, "Distance: 640"), Some((640.0, "labeled_miles")));
        assert_eq!(first_numeric(&MILES_RULES, "12 miles to the yard"), None);
    }

    #[test]
    fn test_weight_modes() {
        let text = "Weight: 800 lbs";
        assert_eq!(first_numeric(&WEIGHT_RULES_STRICT, text), None);
        assert_eq!(first_numeric(&WEIGHT_RULES_LENIENT, text), Some((800.0, "labeled_weight")));
        assert_eq!(first_numeric(&WEIGHT_RULES_STRICT, "42k lbs"), Some((42_000.0, "thousands_then_lbs")));
        assert_eq!(first_numeric(&WEIGHT_RULES_STRICT, "62,000 lbs"), None);
    }

    #[test]
    fn test_load_number_rules_in_order() {
        assert_eq!(
            first_code(&LOAD_NUMBER_RULES, "Load # 88123-A ready"),
            Some(("88123-A".to_string(), "labeled_hash"))
        );
        assert_eq!(
            first_code(&LOAD_NUMBER_RULES, "see #4471923 below"),
            Some(("4471923".to_string(), "bare_hash"))
        );
        assert_eq!(
            first_code(&LOAD_NUMBER_RULES, "Reference: TQL88213"),
            Some(("TQL88213".to_string(), "labeled_code"))
        );
        assert_eq!(first_code(&LOAD_NUMBER_RULES, "Load details: call me"), None);
    }

    #[test]
    fn test_city_state_lane() {
        let (lane, rule) = first_lane("Hot load Dallas, TX to Atlanta, GA tomorrow").unwrap();
        assert_eq!(rule, "city_state_pair");
        assert_eq!(lane.origin_city.as_deref(), Some("Dallas"));
        assert_eq!(lane.origin_state, "TX");
        assert_eq!(lane.dest_city.as_deref(), Some("Atlanta"));
        assert_eq!(lane.dest_state, "GA");
    }

    #[test]
    fn test_all_caps_cities_are_recased() {
        let (lane, _) = first_lane("FORT WORTH, TX → KANSAS CITY, MO").unwrap();
        assert_eq!(lane.origin_city.as_deref(), Some("Fort Worth"));
        assert_eq!(lane.dest_city.as_deref(), Some("Kansas City"));
    }

    #[test]
    fn test_labeled_lane() {
        let text = "Origin: Memphis, TN\nDestination: Columbus, OH";
        let (lane, rule) = first_lane(text).unwrap();
        assert_eq!(rule, "labeled_origin_destination");
        assert_eq!(lane.origin_city.as_deref(), Some("Memphis"));
        assert_eq!(lane.dest_state, "OH");
    }

    #[test]
    fn test_labeled_lane_ignores_lowercase_words() {
        let text = "Pickup: in Dallas tomorrow\nDelivery: in Atlanta Friday\nRate $1500\n750 miles";
        assert!(first_lane(text).is_none());

        let (lane, _) = first_lane("pickup: OK\ndelivery: Portland, ME").unwrap();
        assert_eq!(lane.origin_state, "OK");
        assert_eq!(lane.dest_city.as_deref(), Some("Portland"));
        assert_eq!(lane.dest_state, "ME");
    }

    #[test]
    fn test_bare_state_lane() {
        let (lane, rule) = first_lane("Need trucks TX to OK this week").unwrap();
        assert_eq!(rule, "bare_state_pair");
        assert_eq!((lane.origin_state.as_str(), lane.dest_state.as_str()), ("TX", "OK"));
        assert!(lane.origin_city.is_none());
    }

    #[test]
    fn test_invalid_state_rejects_lane() {
        assert!(first_lane("Dallas, TZ to Atlanta, GA").is_none());
    }
}
