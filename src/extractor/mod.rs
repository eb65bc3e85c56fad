// =============================================================================
// extractor/mod.rs — THE LOAD SIGNAL EXTRACTOR
// =============================================================================
//
// Takes normalized email text and pulls out the load: number, lane, rate,
// miles, equipment, weight, dates, and who to call. Each field runs its own
// ordered rule list (see rules.rs) and simply stays empty when nothing
// plausible is found. The extractor never guesses. A rate of $10,000 for a
// hundred-mile run is not a $100/mile miracle, it is a parsing accident,
// and the derived rate-per-mile is dropped.
//
// Before any of that, is_load_offer() throws out newsletters and anything
// that does not look like a load at all.
// =============================================================================

pub mod contact;
pub mod dates;
pub mod rules;

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::models::ExtractedLoadSignal;
use crate::vocab;

pub const DEFAULT_RATE_PER_MILE_CEILING: f64 = 15.0;
pub const DEFAULT_MIN_CONFIDENCE: u32 = 25;

const WEIGHT_LANE: u32 = 30;
const WEIGHT_RATE: u32 = 25;
const WEIGHT_MILES: u32 = 20;
const WEIGHT_EQUIPMENT: u32 = 10;
const WEIGHT_LOAD_NUMBER: u32 = 5;
const WEIGHT_WEIGHT: u32 = 5;
const WEIGHT_PICKUP: u32 = 3;
const WEIGHT_DELIVERY: u32 = 2;

/// Phrases that only ever show up in newsletters and marketing blasts.
const NEWSLETTER_PHRASES: &[&str] = &[
    "unsubscribe",
    "newsletter",
    "weekly trucking news",
    "view in browser",
    "view this email in your browser",
    "market update",
    "industry news",
    "webinar",
    "email preferences",
];

/// Indicator categories, matched as whole words. A load offer hits at least
/// two of them.
const INDICATOR_CATEGORIES: &[(&str, &[&str])] = &[
    ("pickup", &["pickup", "pickups", "pick up", "pick-up", "pu:", "ship date", "ready date"]),
    ("delivery", &["delivery", "deliveries", "deliver", "delivered", "drop off", "consignee", "del:"]),
    ("origin", &["origin", "shipper"]),
    ("destination", &["destination", "dest:"]),
    ("rate", &["rate", "rates", "pay", "all-in", "all in"]),
    ("miles", &["miles", "mileage", "distance"]),
];

const MIN_INDICATOR_CATEGORIES: usize = 2;

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*\d").expect("dollar amount pattern"));

/// Weight bounds. Strict is for contexts where a light LTL weight is more
/// likely a typo than a real shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    /// 100 - 50,000 lbs
    Lenient,
    /// 1,000 - 50,000 lbs
    #[default]
    Strict,
}

impl std::str::FromStr for WeightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(WeightMode::Strict),
            "lenient" => Ok(WeightMode::Lenient),
            other => Err(format!("unknown weight mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorSettings {
    pub rate_per_mile_ceiling: f64,
    pub weight_mode: WeightMode,
    pub min_confidence: u32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            rate_per_mile_ceiling: DEFAULT_RATE_PER_MILE_CEILING,
            weight_mode: WeightMode::Strict,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Newsletter phrases veto; otherwise at least two indicator categories.
pub fn is_load_offer(text: &str) -> bool {
    let lower = text.to_lowercase();

    if let Some(phrase) = NEWSLETTER_PHRASES.iter().find(|p| lower.contains(*p)) {
        debug!(phrase = *phrase, "Newsletter phrase found, not a load offer");
        return false;
    }

    let mut categories = INDICATOR_CATEGORIES
        .iter()
        .filter(|(_, tokens)| tokens.iter().any(|t| vocab::contains_word(&lower, t)))
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();

    if !categories.contains(&"rate") && DOLLAR_AMOUNT.is_match(text) {
        categories.push("rate");
    }
    if vocab::find_equipment(text).is_some() {
        categories.push("equipment");
    }

    categories.len() >= MIN_INDICATOR_CATEGORIES
}

/// round(rate / miles, 2), or None when either is missing or the result is
/// above the plausibility ceiling.
pub fn derive_rate_per_mile(rate: Option<f64>, miles: Option<f64>, ceiling: f64) -> Option<f64> {
    let (rate, miles) = (rate?, miles?);
    if miles <= 0.0 {
        return None;
    }
    let rpm = (rate / miles * 100.0).round() / 100.0;
    (rpm <= ceiling).then_some(rpm)
}

/// Sum of the fixed per-field weights, capped at 100.
pub fn confidence(signal: &ExtractedLoadSignal) -> u32 {
    let weights = [
        (signal.has_lane(), WEIGHT_LANE),
        (signal.rate.is_some(), WEIGHT_RATE),
        (signal.miles.is_some(), WEIGHT_MILES),
        (signal.equipment.is_some(), WEIGHT_EQUIPMENT),
        (signal.load_number.is_some(), WEIGHT_LOAD_NUMBER),
        (signal.weight_lbs.is_some(), WEIGHT_WEIGHT),
        (signal.pickup_date.is_some(), WEIGHT_PICKUP),
        (signal.delivery_date.is_some(), WEIGHT_DELIVERY),
    ];
    weights
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, weight)| weight)
        .sum::<u32>()
        .min(100)
}

#[derive(Debug, Clone, Default)]
pub struct LoadExtractor {
    settings: ExtractorSettings,
}

impl LoadExtractor {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Extract using today's date to resolve year-less dates.
    pub fn extract(&self, text: &str) -> Option<ExtractedLoadSignal> {
        self.extract_at(text, Utc::now().date_naive())
    }

    /// Extract a load signal, resolving year-less dates against `reference`.
    /// None for non-offers and for anything below the confidence floor.
    pub fn extract_at(&self, text: &str, reference: NaiveDate) -> Option<ExtractedLoadSignal> {
        if text.trim().is_empty() || !is_load_offer(text) {
            return None;
        }

        let mut signal = ExtractedLoadSignal::default();

        if let Some((code, rule)) = rules::first_code(&rules::LOAD_NUMBER_RULES, text) {
            debug!(rule, load_number = %code, "Load number matched");
            signal.load_number = Some(code);
        }

        if let Some((lane, rule)) = rules::first_lane(text) {
            debug!(rule, origin = %lane.origin_state, dest = %lane.dest_state, "Lane matched");
            signal.origin_city = lane.origin_city;
            signal.origin_state = Some(lane.origin_state);
            signal.dest_city = lane.dest_city;
            signal.dest_state = Some(lane.dest_state);
        }

        if let Some((rate, rule)) = rules::first_numeric(&rules::RATE_RULES, text) {
            debug!(rule, rate, "Rate matched");
            signal.rate = Some(rate);
        }

        if let Some((miles, rule)) = rules::first_numeric(&rules::MILES_RULES, text) {
            debug!(rule, miles, "Miles matched");
            signal.miles = Some(miles);
        }

        signal.rate_per_mile =
            derive_rate_per_mile(signal.rate, signal.miles, self.settings.rate_per_mile_ceiling);
        if signal.rate.is_some() && signal.miles.is_some() && signal.rate_per_mile.is_none() {
            debug!(
                rate = signal.rate,
                miles = signal.miles,
                ceiling = self.settings.rate_per_mile_ceiling,
                "Implied rate per mile is implausible, dropped"
            );
        }

        signal.equipment = vocab::find_equipment(text).map(str::to_string);

        let weight_rules = match self.settings.weight_mode {
            WeightMode::Strict => &*rules::WEIGHT_RULES_STRICT,
            WeightMode::Lenient => &*rules::WEIGHT_RULES_LENIENT,
        };
        signal.weight_lbs = rules::first_numeric(weight_rules, text).map(|(w, _)| w);

        let (pickup, delivery) = dates::pickup_and_delivery(text, reference);
        signal.pickup_date = pickup;
        signal.delivery_date = delivery;

        signal.contact_phone = contact::phone(text);
        signal.contact_email = contact::email(text);
        signal.contact_name = contact::name(text);

        signal.confidence = confidence(&signal);
        if signal.confidence < self.settings.min_confidence {
            debug!(
                confidence = signal.confidence,
                floor = self.settings.min_confidence,
                "Load signal below confidence floor, rejected"
            );
            return None;
        }

        Some(signal)
    }

    /// Extract across many texts on the rayon pool.
    pub fn extract_batch(&self, texts: &[&str], reference: NaiveDate) -> Vec<Option<ExtractedLoadSignal>> {
        texts
            .par_iter()
            .map(|text| self.extract_at(text, reference))
            .collect()
    }
}

/// Extract with default settings.
pub fn extract(text: &str) -> Option<ExtractedLoadSignal> {
    LoadExtractor::default().extract(text)
}
