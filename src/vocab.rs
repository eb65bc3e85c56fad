// =============================================================================
// vocab.rs — THE FREIGHT DICTIONARY
// =============================================================================
//
// Word lists shared by the broker identifier and the load extractor: state
// codes, the hub cities every lane seems to start or end in, freight
// keywords, and the equipment vocabulary. Keyword lists are compiled into
// Aho-Corasick automatons once and scanned in a single pass.
// =============================================================================

use aho_corasick::{AhoCorasick, MatchKind};
use std::collections::HashSet;
use std::sync::LazyLock;

/// The fifty states plus DC. Anything else is not a lane endpoint.
pub const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

static STATE_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| US_STATE_CODES.iter().copied().collect());

/// Case-insensitive check against the state list.
pub fn is_us_state(token: &str) -> bool {
    token.len() == 2 && STATE_SET.contains(token.to_ascii_uppercase().as_str())
}

/// Words that show up in broker emails and basically nowhere else.
pub const FREIGHT_KEYWORDS: &[&str] = &[
    "load",
    "loads",
    "freight",
    "lane",
    "lanes",
    "pickup",
    "pick up",
    "delivery",
    "dry van",
    "reefer",
    "flatbed",
    "step deck",
    "power only",
    "truckload",
    "ltl",
    "ftl",
    "rate confirmation",
    "rate con",
    "carrier",
    "carriers",
    "shipper",
    "consignee",
    "dispatch",
    "deadhead",
    "all-in",
    "all in rate",
    "target rate",
    "mc number",
    "mc#",
    "dot number",
    "tarp",
    "lumper",
    "detention",
    "bol",
    "hazmat",
    "team load",
    "drop trailer",
];

/// Cities that anchor most of the lanes in the lower 48.
pub const FREIGHT_HUB_CITIES: &[&str] = &[
    "chicago",
    "dallas",
    "atlanta",
    "los angeles",
    "memphis",
    "houston",
    "laredo",
    "indianapolis",
    "columbus",
    "kansas city",
    "louisville",
    "nashville",
    "charlotte",
    "jacksonville",
    "ontario",
    "phoenix",
    "denver",
    "st. louis",
    "fort worth",
    "savannah",
    "newark",
    "harrisburg",
    "allentown",
    "salt lake city",
    "seattle",
    "miami",
];

/// Substrings in a sender domain that smell like a brokerage.
pub const BROKER_DOMAIN_HINTS: &[&str] = &[
    "logistics",
    "freight",
    "transport",
    "3pl",
    "brokerage",
    "shipping",
    "trucking",
    "carriers",
];

/// Consumer mailbox providers. A broker working out of gmail still gets
/// identified on content, we just cannot name the company from the domain.
pub const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "protonmail.com",
];

/// (match text, canonical display name). Matched case-insensitively,
/// leftmost-longest, so "refrigerated" beats nothing and "step deck" beats "deck".
pub const EQUIPMENT_VOCABULARY: &[(&str, &str)] = &[
    ("dry van", "Dry Van"),
    ("dryvan", "Dry Van"),
    ("53' van", "Dry Van"),
    ("reefer", "Reefer"),
    ("refrigerated", "Reefer"),
    ("flatbed", "Flatbed"),
    ("flat bed", "Flatbed"),
    ("step deck", "Step Deck"),
    ("stepdeck", "Step Deck"),
    ("double drop", "Double Drop"),
    ("lowboy", "Lowboy"),
    ("rgn", "RGN"),
    ("power only", "Power Only"),
    ("conestoga", "Conestoga"),
    ("hotshot", "Hotshot"),
    ("hot shot", "Hotshot"),
    ("box truck", "Box Truck"),
    ("sprinter", "Sprinter Van"),
    ("tanker", "Tanker"),
    ("intermodal", "Intermodal Container"),
];

pub static FREIGHT_KEYWORD_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(FREIGHT_KEYWORDS)
        .expect("Failed to build freight keyword automaton")
});

pub static HUB_CITY_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(FREIGHT_HUB_CITIES)
        .expect("Failed to build hub city automaton")
});

pub static EQUIPMENT_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(EQUIPMENT_VOCABULARY.iter().map(|(pattern, _)| *pattern))
        .expect("Failed to build equipment automaton")
});

/// Number of distinct freight keywords present in `text` as whole words.
pub fn distinct_keyword_hits(text: &str) -> usize {
    FREIGHT_KEYWORD_AUTOMATON
        .find_iter(text)
        .filter(|m| on_word_boundary(text, m.start(), m.end()))
        .map(|m| m.pattern())
        .collect::<HashSet<_>>()
        .len()
}

/// True when a hub city appears as a whole word.
pub fn mentions_hub_city(text: &str) -> bool {
    HUB_CITY_AUTOMATON
        .find_iter(text)
        .any(|m| on_word_boundary(text, m.start(), m.end()))
}

/// First equipment term in the text, as its canonical display name.
pub fn find_equipment(text: &str) -> Option<&'static str> {
    EQUIPMENT_AUTOMATON
        .find_iter(text)
        .find(|m| on_word_boundary(text, m.start(), m.end()))
        .map(|m| EQUIPMENT_VOCABULARY[m.pattern().as_usize()].1)
}

/// True when the match at `start..end` is not glued to a letter or digit.
pub fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
}

/// True when `needle` occurs in `haystack` as a whole word. Boundaries are
/// only enforced on the ends of `needle` that are letters or digits, so a
/// token like "pu:" still matches "PU:Dallas" once lowercased.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    let check_start = needle.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let check_end = needle.chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric());
    haystack.match_indices(needle).any(|(start, found)| {
        let end = start + found.len();
        let before_ok = !check_start
            || !haystack[..start].chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric());
        let after_ok = !check_end
            || !haystack[end..].chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
        before_ok && after_ok
    })
}

/// "DALLAS" -> "Dallas", "fort WORTH" -> "Fort Worth", "hub-group" -> "Hub-Group".
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_word = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = c != '\'';
        }
    }
    out
}
