// =============================================================================
// models.rs — THE LOAD BOARD, AS DATA STRUCTURES
// =============================================================================
//
// Everything that flows through the engine lives here: the raw email the
// mail-sync layer hands us, the broker directory entries, the load signal we
// squeeze out of the text, the carrier's preferences, and the rolling
// statistics we keep about every broker who has ever emailed us a lane.
//
// Transient values (identification, extracted load, fit score) are created
// once per message and never mutated. BrokerStats is the only aggregate, and
// it is always rebuilt from scratch by relationship::recompute.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// One email as delivered by the mail-sync collaborator.
/// Only one of `body_text` / `body_html` needs to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Provider message id. Used for dedup and carried onto the load record.
    pub id: String,
    pub from_address: String,
    #[serde(default)]
    pub from_display_name: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// How big a fish the broker is. Informational; matching treats all classes alike.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BrokerClass {
    /// The household names: C.H. Robinson, TQL, Coyote and friends
    Major,
    /// Mid-size shops that own a region and answer their phones
    Regional,
    /// App-first brokerages that email you from a no-reply address
    Digital,
}

impl fmt::Display for BrokerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerClass::Major => write!(f, "major"),
            BrokerClass::Regional => write!(f, "regional"),
            BrokerClass::Digital => write!(f, "digital"),
        }
    }
}

impl std::str::FromStr for BrokerClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(BrokerClass::Major),
            "regional" => Ok(BrokerClass::Regional),
            "digital" => Ok(BrokerClass::Digital),
            other => Err(format!("unknown broker class '{other}'")),
        }
    }
}

/// A known broker and the email domain it sends from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerDirectoryEntry {
    pub name: String,
    /// Lowercased, no leading `@` or `www.`
    pub domain: String,
    pub class: BrokerClass,
}

impl BrokerDirectoryEntry {
    pub fn new(name: impl Into<String>, domain: impl Into<String>, class: BrokerClass) -> Self {
        let domain = domain.into().trim().to_ascii_lowercase();
        let domain = domain
            .trim_start_matches('@')
            .trim_start_matches("www.")
            .to_string();
        Self {
            name: name.into().trim().to_string(),
            domain,
            class,
        }
    }

    /// The part of the domain before the first dot ("hubgroup" for "hubgroup.com").
    pub fn base_name(&self) -> &str {
        self.domain.split('.').next().unwrap_or(&self.domain)
    }
}

/// Qualitative confidence bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

/// The verdict on whether a sender is a freight broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerIdentification {
    pub is_broker: bool,
    pub broker_name: Option<String>,
    pub confidence_tier: ConfidenceTier,
    /// Winning domain similarity in [0,1]; 0 when no directory entry matched.
    pub similarity_score: f64,
    /// Sender domain as parsed from the address, lowercased.
    pub sender_domain: Option<String>,
    /// Distinct freight keywords seen in subject + body.
    pub keyword_hits: usize,
    /// Keyword hits plus the subject/state/hub-city bonuses.
    pub content_score: u32,
}

impl BrokerIdentification {
    pub fn not_a_broker(sender_domain: Option<String>, keyword_hits: usize, content_score: u32) -> Self {
        Self {
            is_broker: false,
            broker_name: None,
            confidence_tier: ConfidenceTier::Low,
            similarity_score: 0.0,
            sender_domain,
            keyword_hits,
            content_score,
        }
    }
}

/// Everything we managed to pull out of one load email. Any field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLoadSignal {
    pub load_number: Option<String>,
    pub origin_city: Option<String>,
    pub origin_state: Option<String>,
    pub dest_city: Option<String>,
    pub dest_state: Option<String>,
    pub rate: Option<f64>,
    pub miles: Option<f64>,
    pub rate_per_mile: Option<f64>,
    pub equipment: Option<String>,
    pub weight_lbs: Option<f64>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    /// 0-100, sum of per-field weights
    pub confidence: u32,
}

impl ExtractedLoadSignal {
    pub fn has_lane(&self) -> bool {
        self.origin_state.is_some() && self.dest_state.is_some()
    }

    /// "Dallas, TX → Atlanta, GA", or "TX → GA" when cities are unknown.
    pub fn lane(&self) -> Option<String> {
        let origin = lane_endpoint(self.origin_city.as_deref(), self.origin_state.as_deref()?);
        let dest = lane_endpoint(self.dest_city.as_deref(), self.dest_state.as_deref()?);
        Some(format!("{origin} → {dest}"))
    }
}

pub(crate) fn lane_endpoint(city: Option<&str>, state: &str) -> String {
    match city {
        Some(city) => format!("{city}, {state}"),
        None => state.to_string(),
    }
}

/// The carrier's stated preferences. Loaded once per run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPreferences {
    pub min_rate_per_mile: f64,
    #[serde(default)]
    pub preferred_states: BTreeSet<String>,
    #[serde(default)]
    pub preferred_equipment: BTreeSet<String>,
    #[serde(alias = "maxDistance")]
    pub max_distance_miles: f64,
    /// Informational only; no scoring component reads it.
    #[serde(default)]
    pub home_base: Option<String>,
}

impl Default for CompanyPreferences {
    fn default() -> Self {
        Self {
            min_rate_per_mile: 2.00,
            preferred_states: BTreeSet::new(),
            preferred_equipment: BTreeSet::from(["Dry Van".to_string()]),
            max_distance_miles: 500.0,
            home_base: None,
        }
    }
}

/// How well a load fits the carrier, with a note for every shortfall.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadFitScore {
    pub score: f64,
    pub reasons: Vec<String>,
}

impl LoadFitScore {
    pub fn joined_reasons(&self) -> String {
        self.reasons.join("; ")
    }
}

/// One row of a broker's top-lanes list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaneStat {
    pub lane: String,
    pub count: u32,
    pub avg_rate: Option<f64>,
}

/// The rolling relationship aggregate for one broker. Always a full recompute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    pub broker_key: String,
    pub total_loads: u32,
    pub loads_this_week: u32,
    pub loads_this_month: u32,
    pub avg_rate_per_mile: Option<f64>,
    pub highest_rate: Option<f64>,
    pub lowest_rate: Option<f64>,
    pub top_lanes: Vec<LaneStat>,
    pub lane_count: u32,
    pub first_contact_at: DateTime<Utc>,
    pub last_contact_at: DateTime<Utc>,
    pub avg_days_between_contacts: Option<f64>,
    pub relationship_score: f64,
}

/// The `Load` record handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadRecord {
    pub id: String,
    pub message_id: String,
    pub received_at: DateTime<Utc>,
    pub broker_name: Option<String>,
    pub broker_email: String,
    pub signal: ExtractedLoadSignal,
    pub fit_score: f64,
    pub fit_reasons: String,
}

impl LoadRecord {
    pub fn new(
        message: &RawMessage,
        broker_name: Option<String>,
        signal: ExtractedLoadSignal,
        fit: &LoadFitScore,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: message.id.clone(),
            received_at: message.received_at,
            broker_name,
            broker_email: message.from_address.clone(),
            signal,
            fit_score: fit.score,
            fit_reasons: fit.joined_reasons(),
        }
    }

    pub fn history_entry(&self) -> LoadHistoryEntry {
        LoadHistoryEntry {
            message_id: self.message_id.clone(),
            received_at: self.received_at,
            origin_city: self.signal.origin_city.clone(),
            origin_state: self.signal.origin_state.clone(),
            dest_city: self.signal.dest_city.clone(),
            dest_state: self.signal.dest_state.clone(),
            rate: self.signal.rate,
            rate_per_mile: self.signal.rate_per_mile,
        }
    }
}

/// The slice of a persisted load the relationship recompute actually reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadHistoryEntry {
    pub message_id: String,
    pub received_at: DateTime<Utc>,
    pub origin_city: Option<String>,
    pub origin_state: Option<String>,
    pub dest_city: Option<String>,
    pub dest_state: Option<String>,
    pub rate: Option<f64>,
    pub rate_per_mile: Option<f64>,
}

impl LoadHistoryEntry {
    /// (origin, destination) labels, present only when both states are known.
    pub fn lane_pair(&self) -> Option<(String, String)> {
        let origin = lane_endpoint(self.origin_city.as_deref(), self.origin_state.as_deref()?);
        let dest = lane_endpoint(self.dest_city.as_deref(), self.dest_state.as_deref()?);
        Some((origin, dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_entry_normalizes_domain() {
        let entry = BrokerDirectoryEntry::new("Hub Group", " @WWW.HubGroup.com ", BrokerClass::Major);
        assert_eq!(entry.domain, "hubgroup.com");
        assert_eq!(entry.base_name(), "hubgroup");
    }

    #[test]
    fn test_lane_rendering() {
        let signal = ExtractedLoadSignal {
            origin_city: Some("Dallas".into()),
            origin_state: Some("TX".into()),
            dest_state: Some("GA".into()),
            ..Default::default()
        };
        assert_eq!(signal.lane().as_deref(), Some("Dallas, TX → GA"));
        assert!(ExtractedLoadSignal::default().lane().is_none());
    }

    #[test]
    fn test_raw_message_deserializes_camel_case() {
        let json = r#"{"id":"m1","fromAddress":"ops@tql.com","subject":"Load","bodyText":"hi","receivedAt":"2024-03-01T12:00:00Z"}"#;
        let msg: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.from_address, "ops@tql.com");
        assert!(msg.body_html.is_none());
    }

    #[test]
    fn test_broker_class_parses() {
        assert_eq!("Digital".parse::<BrokerClass>(), Ok(BrokerClass::Digital));
        assert!("mega".parse::<BrokerClass>().is_err());
    }
}
