// =============================================================================
// config.rs — THE DISPATCHER'S CLIPBOARD
// =============================================================================
//
// What the carrier wants (rate floor, states, trailer, haul length) and how
// picky the extractor should be. Everything comes from BROKER_SIGNAL_*
// environment variables, optionally loaded from a .env file, with defaults
// that work for a dry van carrier who will not roll for less than $2.00/mi.
//
// Preferences can also come from a JSON file. When BROKER_SIGNAL_PREFERENCES_FILE
// is set, the file wins over the individual preference variables.
// =============================================================================

use std::env;
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::extractor::{
    ExtractorSettings, WeightMode, DEFAULT_MIN_CONFIDENCE, DEFAULT_RATE_PER_MILE_CEILING,
};
use crate::models::{BrokerClass, BrokerDirectoryEntry, CompanyPreferences};

const PREFIX: &str = "BROKER_SIGNAL_";

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // CARRIER PREFERENCES
    // =========================================================================
    /// Loaded once, never mutated during a run.
    pub preferences: CompanyPreferences,

    // =========================================================================
    // EXTRACTION
    // =========================================================================
    /// Rate-per-mile ceiling, weight bounds, confidence floor.
    pub extractor: ExtractorSettings,

    // =========================================================================
    // STORE
    // =========================================================================
    /// Upper bound on one read-recompute-replace round trip.
    pub store_timeout: Duration,

    // =========================================================================
    // MESSAGE DEDUP
    // =========================================================================
    pub dedup_bloom_items: usize,
    pub dedup_bloom_fp_rate: f64,
    pub dedup_lru_size: usize,
    pub dedup_rotation_interval: Duration,

    // =========================================================================
    // BROKER DIRECTORY
    // =========================================================================
    /// Added on top of the seed list at startup.
    pub custom_brokers: Vec<BrokerDirectoryEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferences: CompanyPreferences::default(),
            extractor: ExtractorSettings::default(),
            store_timeout: Duration::from_millis(5_000),
            dedup_bloom_items: 100_000,
            dedup_bloom_fp_rate: 0.01,
            dedup_lru_size: 10_000,
            dedup_rotation_interval: Duration::from_secs(3_600),
            custom_brokers: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the process environment (and .env, if there is one).
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup. Keys are passed without the prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{PREFIX}{key}")).filter(|value| !value.trim().is_empty())
        };
        let defaults = Config::default();

        let preferences = match get("PREFERENCES_FILE") {
            Some(path) => load_preferences_file(&path)?,
            None => {
                let base = CompanyPreferences::default();
                CompanyPreferences {
                    min_rate_per_mile: parse_or(get("MIN_RATE_PER_MILE"), base.min_rate_per_mile),
                    preferred_states: get("PREFERRED_STATES")
                        .map(|raw| comma_list(&raw).map(|s| s.to_ascii_uppercase()).collect())
                        .unwrap_or(base.preferred_states),
                    preferred_equipment: get("PREFERRED_EQUIPMENT")
                        .map(|raw| comma_list(&raw).map(str::to_string).collect())
                        .unwrap_or(base.preferred_equipment),
                    max_distance_miles: parse_or(get("MAX_DISTANCE_MILES"), base.max_distance_miles),
                    home_base: get("HOME_BASE").or(base.home_base),
                }
            }
        };

        let extractor = ExtractorSettings {
            rate_per_mile_ceiling: parse_or(get("RPM_CEILING"), DEFAULT_RATE_PER_MILE_CEILING),
            weight_mode: parse_or(get("WEIGHT_MODE"), WeightMode::default()),
            min_confidence: parse_or(get("MIN_EXTRACTION_CONFIDENCE"), DEFAULT_MIN_CONFIDENCE),
        };

        Ok(Config {
            preferences,
            extractor,
            store_timeout: Duration::from_millis(parse_or(
                get("STORE_TIMEOUT_MS"),
                defaults.store_timeout.as_millis() as u64,
            )),
            dedup_bloom_items: parse_or(get("DEDUP_BLOOM_ITEMS"), defaults.dedup_bloom_items),
            dedup_bloom_fp_rate: parse_or(get("DEDUP_BLOOM_FP_RATE"), defaults.dedup_bloom_fp_rate),
            dedup_lru_size: parse_or(get("DEDUP_LRU_SIZE"), defaults.dedup_lru_size),
            dedup_rotation_interval: Duration::from_secs(parse_or(
                get("DEDUP_ROTATION_SECS"),
                defaults.dedup_rotation_interval.as_secs(),
            )),
            custom_brokers: get("CUSTOM_BROKERS")
                .map(|raw| parse_custom_brokers(&raw))
                .unwrap_or_default(),
        })
    }
}

/// Read a `CompanyPreferences` JSON document.
pub fn load_preferences_file(path: &str) -> Result<CompanyPreferences, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let mut prefs: CompanyPreferences =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
    prefs.preferred_states = prefs
        .preferred_states
        .iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .collect();
    Ok(prefs)
}

/// `Name|domain|class;Name|domain` → directory entries. Class defaults to
/// regional. Malformed entries are logged and skipped.
pub fn parse_custom_brokers(raw: &str) -> Vec<BrokerDirectoryEntry> {
    raw.split(';')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| {
            let mut parts = chunk.split('|').map(str::trim);
            let name = parts.next().filter(|n| !n.is_empty());
            let domain = parts.next().filter(|d| !d.is_empty());
            let class = match parts.next() {
                Some(raw_class) => match raw_class.parse::<BrokerClass>() {
                    Ok(class) => Some(class),
                    Err(err) => {
                        warn!(entry = chunk, error = %err, "Skipping custom broker");
                        None
                    }
                },
                None => Some(BrokerClass::Regional),
            };
            match (name, domain, class) {
                (Some(name), Some(domain), Some(class)) => {
                    Some(BrokerDirectoryEntry::new(name, domain, class))
                }
                (_, _, Some(_)) => {
                    warn!(entry = chunk, "Skipping custom broker without name and domain");
                    None
                }
                _ => None,
            }
        })
        .collect()
}

fn comma_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Parse an optional value, falling back on absence or garbage.
fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_any_variables() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.preferences, CompanyPreferences::default());
        assert_eq!(config.extractor, ExtractorSettings::default());
        assert_eq!(config.store_timeout, Duration::from_millis(5_000));
        assert!(config.custom_brokers.is_empty());
    }

    #[test]
    fn test_preference_variables() {
        let config = Config::from_lookup(lookup(&[
            ("MIN_RATE_PER_MILE", "2.25"),
            ("PREFERRED_STATES", "tx, OK ,"),
            ("PREFERRED_EQUIPMENT", "Reefer,Dry Van"),
            ("MAX_DISTANCE_MILES", "650"),
            ("HOME_BASE", "Dallas, TX"),
            ("WEIGHT_MODE", "lenient"),
            ("STORE_TIMEOUT_MS", "not-a-number"),
        ]))
        .unwrap();

        let prefs = &config.preferences;
        assert_eq!(prefs.min_rate_per_mile, 2.25);
        assert_eq!(
            prefs.preferred_states,
            BTreeSet::from(["OK".to_string(), "TX".to_string()])
        );
        assert_eq!(prefs.preferred_equipment.len(), 2);
        assert_eq!(prefs.max_distance_miles, 650.0);
        assert_eq!(prefs.home_base.as_deref(), Some("Dallas, TX"));
        assert_eq!(config.extractor.weight_mode, WeightMode::Lenient);
        assert_eq!(config.store_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn test_custom_brokers() {
        let brokers = parse_custom_brokers(
            "Prairie Freight|prairiefreight.com|regional; Bad|x.com|mega ;|nodomain.com; Solo|solo.io",
        );
        assert_eq!(brokers.len(), 2);
        assert_eq!(brokers[0].name, "Prairie Freight");
        assert_eq!(brokers[1].domain, "solo.io");
        assert_eq!(brokers[1].class, BrokerClass::Regional);
    }

    #[test]
    fn test_missing_preferences_file_is_an_error() {
        let err = Config::from_lookup(lookup(&[(
            "PREFERENCES_FILE",
            "/definitely/not/here/prefs.json",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_preferences_file_overrides_variables() {
        let path = env::temp_dir().join(format!("broker-signal-prefs-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{"minRatePerMile": 2.5, "preferredStates": ["ga", "FL"], "maxDistance": 800}"#,
        )
        .unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config = Config::from_lookup(lookup(&[
            ("PREFERENCES_FILE", path_str.as_str()),
            ("MIN_RATE_PER_MILE", "1.0"),
        ]))
        .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.preferences.min_rate_per_mile, 2.5);
        assert!(config.preferences.preferred_states.contains("GA"));
        assert_eq!(config.preferences.max_distance_miles, 800.0);
        assert!(config.preferences.preferred_equipment.is_empty());
    }
}
