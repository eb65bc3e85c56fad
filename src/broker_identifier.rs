// =============================================================================
// broker_identifier.rs — IS THIS SENDER A FREIGHT BROKER?
// =============================================================================
//
// Two independent signals, combined by an ordered rule list:
//
// 1. Domain similarity against the broker directory. Exact and subdomain
//    matches are certain. Mail-infrastructure prefixes ("mail-", "send.")
//    get stripped and retried. Then Levenshtein similarity, then a
//    base-name containment heuristic. Best match across the whole directory
//    wins. If nothing in the directory matches, the domain itself might
//    still scream brokerage ("acme-logistics.com").
//
// 2. Content. Freight keywords, a broker-style subject line ("Load #88123",
//    "Rate Con", "TX → GA"), state codes, and hub cities.
//
// A sender domain that turns up in every message of a backfill gets its
// directory scan cached in an LRU keyed by domain.
// =============================================================================

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::broker_directory::BrokerDirectory;
use crate::models::{BrokerDirectoryEntry, BrokerIdentification, ConfidenceTier};
use crate::vocab::{self, BROKER_DOMAIN_HINTS, FREE_MAIL_DOMAINS};

const EXACT_SIMILARITY: f64 = 1.0;
const STRIPPED_SIMILARITY: f64 = 0.95;
const CONTAINS_SIMILARITY: f64 = 0.85;
const FUZZY_ACCEPT: f64 = 0.75;
const BASE_NAME_SIMILARITY: f64 = 0.8;
const BASE_NAME_MIN_LEN: usize = 5;

const HIGH_TIER: f64 = 0.95;
const MEDIUM_TIER: f64 = 0.80;

const DOMAIN_CACHE_SIZE: usize = 4096;

/// Prefixes bulk-mail platforms put in front of the real company domain.
const MAIL_INFRA_PREFIXES: &[&str] = &[
    "mail.", "smtp.", "send.", "email.", "mailer.", "em.", "mx.", "bounce.", "mail-", "send-",
    "email-",
];

static SUBJECT_LOAD_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:load|ref|order|shipment)\s*(?:#|no\.?|number)\s*:?\s*[A-Z0-9-]{3,}")
        .expect("subject load number pattern")
});

static SUBJECT_RATE_CON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brate\s*con(?:firmation|f)?\b").expect("subject rate con pattern")
});

static SUBJECT_LANE_ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{2}\s*(?:->|→|=>|>|\s(?:to|TO)\s)\s*(?:[A-Z][A-Za-z .]*,\s*)?[A-Z]{2}\b")
        .expect("subject lane pattern")
});

static STATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}\b").expect("state token pattern"));

/// The domain of a sender, as every domain rule sees it.
struct DomainCandidate {
    full: String,
    stripped: Option<String>,
}

impl DomainCandidate {
    fn new(domain: &str) -> Self {
        let stripped = MAIL_INFRA_PREFIXES
            .iter()
            .find_map(|prefix| domain.strip_prefix(prefix))
            .filter(|rest| rest.contains('.'))
            .map(str::to_string);
        Self {
            full: domain.to_string(),
            stripped,
        }
    }
}

type DomainRule = fn(&DomainCandidate, &BrokerDirectoryEntry) -> Option<f64>;

/// Evaluated in order per directory entry; the first rule that fires decides
/// that entry's similarity.
const DOMAIN_RULES: &[(&str, DomainRule)] = &[
    ("exact_or_subdomain", exact_rule),
    ("mail_prefix_stripped", stripped_rule),
    ("edit_distance", edit_distance_rule),
    ("base_name_contained", base_name_rule),
];

fn matches_domain(candidate: &str, domain: &str) -> bool {
    candidate == domain
        || candidate
            .strip_suffix(domain)
            .is_some_and(|head| head.ends_with('.'))
}

fn exact_rule(candidate: &DomainCandidate, entry: &BrokerDirectoryEntry) -> Option<f64> {
    matches_domain(&candidate.full, &entry.domain).then_some(EXACT_SIMILARITY)
}

fn stripped_rule(candidate: &DomainCandidate, entry: &BrokerDirectoryEntry) -> Option<f64> {
    let stripped = candidate.stripped.as_deref()?;
    matches_domain(stripped, &entry.domain).then_some(STRIPPED_SIMILARITY)
}

fn edit_distance_rule(candidate: &DomainCandidate, entry: &BrokerDirectoryEntry) -> Option<f64> {
    let similarity = domain_similarity(&candidate.full, &entry.domain);
    (similarity >= FUZZY_ACCEPT).then_some(similarity)
}

fn base_name_rule(candidate: &DomainCandidate, entry: &BrokerDirectoryEntry) -> Option<f64> {
    let base = entry.base_name();
    (base.chars().count() >= BASE_NAME_MIN_LEN && candidate.full.contains(base))
        .then_some(BASE_NAME_SIMILARITY)
}

/// `(maxLen - editDistance) / maxLen`, or a flat 0.85 when one contains the other.
pub fn domain_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(b) || b.contains(a) {
        return CONTAINS_SIMILARITY;
    }
    let max_len = a.chars().count().max(b.chars().count()) as f64;
    let distance = strsim::levenshtein(a, b) as f64;
    ((max_len - distance) / max_len).max(0.0)
}

/// Winning directory entry for one sender domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainMatch {
    pub broker_name: String,
    pub domain: String,
    pub similarity: f64,
    pub rule: &'static str,
}

impl DomainMatch {
    pub fn tier(&self) -> ConfidenceTier {
        tier_for(self.similarity)
    }
}

pub fn tier_for(similarity: f64) -> ConfidenceTier {
    if similarity >= HIGH_TIER {
        ConfidenceTier::High
    } else if similarity >= MEDIUM_TIER {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// Best match across the directory. Ties go to the earlier entry.
pub fn best_domain_match(domain: &str, entries: &[BrokerDirectoryEntry]) -> Option<DomainMatch> {
    if domain.is_empty() {
        return None;
    }
    let candidate = DomainCandidate::new(domain);
    let mut best: Option<DomainMatch> = None;

    for entry in entries {
        let Some((rule, similarity)) = DOMAIN_RULES
            .iter()
            .find_map(|(name, rule)| rule(&candidate, entry).map(|s| (*name, s)))
        else {
            continue;
        };

        if best.as_ref().map_or(true, |b| similarity > b.similarity) {
            best = Some(DomainMatch {
                broker_name: entry.name.clone(),
                domain: entry.domain.clone(),
                similarity,
                rule,
            });
        }
    }

    best
}

/// Pull the domain out of "ops@tql.com", "Jane <Jane@Loads.TQL.com>", etc.
pub fn sender_domain(from_address: &str) -> Option<String> {
    let address = match (from_address.rfind('<'), from_address.rfind('>')) {
        (Some(open), Some(close)) if open < close => &from_address[open + 1..close],
        _ => from_address,
    };
    let (_, domain) = address.trim().rsplit_once('@')?;
    let domain = domain
        .trim()
        .trim_end_matches(['>', '.', ';', ','])
        .to_ascii_lowercase();
    (!domain.is_empty() && domain.contains('.')).then_some(domain)
}

/// "acme-logistics.com" -> "Acme Logistics". A mail-infrastructure prefix
/// is dropped first, so "mail.acme-logistics.com" names the same company.
pub fn display_name_from_domain(domain: &str) -> Option<String> {
    let candidate = DomainCandidate::new(domain);
    let domain = candidate.stripped.as_deref().unwrap_or(domain);
    let label = domain.split('.').find(|l| !l.is_empty() && *l != "www")?;
    let words: Vec<_> = label
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(vocab::title_case)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn is_free_mail(domain: &str) -> bool {
    FREE_MAIL_DOMAINS.contains(&domain)
}

/// The content-side signal, computed without looking at the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSignal {
    pub keyword_hits: usize,
    pub subject_pattern: bool,
    pub has_state_token: bool,
    pub has_hub_city: bool,
}

impl ContentSignal {
    pub fn analyze(subject: &str, body: &str) -> Self {
        let combined = format!("{subject}\n{body}");
        let keyword_hits = vocab::distinct_keyword_hits(&combined);
        let subject_pattern = SUBJECT_LOAD_NUMBER.is_match(subject)
            || SUBJECT_RATE_CON.is_match(subject)
            || SUBJECT_LANE_ARROW.is_match(subject);
        let has_state_token = STATE_TOKEN
            .find_iter(&combined)
            .any(|m| vocab::is_us_state(m.as_str()));
        let has_hub_city = vocab::mentions_hub_city(&combined);

        Self {
            keyword_hits,
            subject_pattern,
            has_state_token,
            has_hub_city,
        }
    }

    pub fn score(&self) -> u32 {
        let mut score = self.keyword_hits as u32;
        if self.subject_pattern {
            score += 3;
        }
        if self.has_state_token {
            score += 2;
        }
        if self.has_hub_city {
            score += 1;
        }
        score
    }

    pub fn has_broker_keywords(&self) -> bool {
        self.score() >= 2
    }
}

/// An accepted (medium or better) domain-side verdict.
#[derive(Debug, Clone, PartialEq)]
struct DomainVerdict {
    broker_name: String,
    similarity: f64,
    tier: ConfidenceTier,
}

struct Evidence {
    domain: Option<DomainVerdict>,
    content: ContentSignal,
}

impl Evidence {
    fn domain_tier(&self) -> Option<ConfidenceTier> {
        self.domain.as_ref().map(|d| d.tier)
    }
}

type DecisionRule = fn(&Evidence) -> bool;

/// First rule that holds decides the tier. Nothing holds: not a broker.
const DECISION_RULES: &[(&str, DecisionRule, ConfidenceTier)] = &[
    (
        "domain_high",
        |e| e.domain_tier() == Some(ConfidenceTier::High),
        ConfidenceTier::High,
    ),
    (
        "subject_and_strong_content",
        |e| e.content.subject_pattern && e.content.score() >= 4,
        ConfidenceTier::High,
    ),
    (
        "subject_state_and_keywords",
        |e| e.content.subject_pattern && e.content.has_state_token && e.content.keyword_hits >= 2,
        ConfidenceTier::High,
    ),
    (
        "domain_medium_with_keywords",
        |e| e.domain_tier() == Some(ConfidenceTier::Medium) && e.content.has_broker_keywords(),
        ConfidenceTier::Medium,
    ),
    (
        "content_only",
        |e| e.domain.is_none() && e.content.score() >= 4,
        ConfidenceTier::Medium,
    ),
    (
        "subject_with_keywords",
        |e| e.content.subject_pattern && e.content.score() >= 2,
        ConfidenceTier::Medium,
    ),
];

struct DomainCache {
    generation: u64,
    entries: LruCache<String, Option<DomainMatch>>,
}

pub struct BrokerIdentifier {
    directory: Arc<BrokerDirectory>,
    cache: Mutex<DomainCache>,
}

impl BrokerIdentifier {
    pub fn new(directory: Arc<BrokerDirectory>) -> Self {
        let generation = directory.generation();
        let capacity = NonZeroUsize::new(DOMAIN_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            directory,
            cache: Mutex::new(DomainCache {
                generation,
                entries: LruCache::new(capacity),
            }),
        }
    }

    pub fn directory(&self) -> &Arc<BrokerDirectory> {
        &self.directory
    }

    /// Directory scan for one domain, through the cache.
    pub fn match_domain(&self, domain: &str) -> Option<DomainMatch> {
        let generation = self.directory.generation();
        {
            let mut cache = self.cache.lock();
            if cache.generation != generation {
                cache.entries.clear();
                cache.generation = generation;
            }
            if let Some(hit) = cache.entries.get(domain) {
                return hit.clone();
            }
        }

        let result = best_domain_match(domain, &self.directory.snapshot());

        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.entries.put(domain.to_string(), result.clone());
        }
        result
    }

    fn domain_verdict(&self, domain: &str) -> Option<DomainVerdict> {
        if let Some(found) = self.match_domain(domain) {
            let tier = found.tier();
            if tier != ConfidenceTier::Low {
                return Some(DomainVerdict {
                    broker_name: found.broker_name,
                    similarity: found.similarity,
                    tier,
                });
            }
        }

        if is_free_mail(domain) {
            return None;
        }
        let label = domain.rsplit_once('.').map_or(domain, |(head, _)| head);
        if BROKER_DOMAIN_HINTS.iter().any(|hint| label.contains(hint)) {
            return Some(DomainVerdict {
                broker_name: display_name_from_domain(domain)?,
                similarity: 0.0,
                tier: ConfidenceTier::Medium,
            });
        }
        None
    }

    /// Decide whether the sender is a freight broker.
    pub fn identify(&self, from_address: &str, subject: &str, body: &str) -> BrokerIdentification {
        let domain = sender_domain(from_address);
        let content = ContentSignal::analyze(subject, body);
        let verdict = domain.as_deref().and_then(|d| self.domain_verdict(d));
        let evidence = Evidence {
            domain: verdict,
            content,
        };

        let Some((rule, _, tier)) = DECISION_RULES.iter().find(|(_, holds, _)| holds(&evidence))
        else {
            debug!(
                domain = domain.as_deref().unwrap_or("-"),
                content_score = content.score(),
                "Sender is not a broker"
            );
            return BrokerIdentification::not_a_broker(domain, content.keyword_hits, content.score());
        };

        let (broker_name, similarity) = match &evidence.domain {
            Some(verdict) => (Some(verdict.broker_name.clone()), verdict.similarity),
            None => (
                domain
                    .as_deref()
                    .filter(|d| !is_free_mail(d))
                    .and_then(display_name_from_domain),
                0.0,
            ),
        };

        debug!(
            domain = domain.as_deref().unwrap_or("-"),
            broker = broker_name.as_deref().unwrap_or("-"),
            rule = *rule,
            tier = %tier,
            similarity = similarity,
            content_score = content.score(),
            "Broker identified"
        );

        BrokerIdentification {
            is_broker: true,
            broker_name,
            confidence_tier: *tier,
            similarity_score: similarity,
            sender_domain: domain,
            keyword_hits: content.keyword_hits,
            content_score: content.score(),
        }
    }
}
