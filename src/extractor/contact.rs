// Who to call about the load: phone, email, and the name under the sign-off.

use regex::Regex;
use std::sync::LazyLock;

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?\(?\b([2-9]\d{2})\)?[\s.-]?(\d{3})[\s.-](\d{4})\b")
        .expect("phone pattern")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").expect("email pattern")
});

static SIGN_OFF_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:(?:best|kind|warm|warmest)\s+regards|regards|thank you|thanks|sincerely|best|cheers)[,!.]*\s+([A-Z][a-z]+)\s+([A-Z][a-z]+(?:-[A-Z][a-z]+)?)\b",
    )
    .expect("sign-off pattern")
});

/// Words that belong to the sign-off itself, never to the name under it.
const SIGN_OFF_WORDS: &[&str] = &[
    "regards", "thanks", "thank", "you", "sincerely", "best", "cheers", "kind", "warm", "warmest",
];

/// Mailbox words that mean "this is the desk that actually books trucks".
const OPERATIONS_HINTS: &[&str] = &["ops", "operations", "dispatch"];

/// First US phone number, normalized to XXX-XXX-XXXX.
pub fn phone(text: &str) -> Option<String> {
    let caps = PHONE.captures(text)?;
    Some(format!(
        "{}-{}-{}",
        caps.get(1)?.as_str(),
        caps.get(2)?.as_str(),
        caps.get(3)?.as_str()
    ))
}

/// An ops/dispatch mailbox if one is mentioned, otherwise the first address.
pub fn email(text: &str) -> Option<String> {
    let addresses: Vec<String> = EMAIL
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();

    addresses
        .iter()
        .find(|address| {
            let local = address.split('@').next().unwrap_or_default();
            OPERATIONS_HINTS.iter().any(|hint| local.contains(hint))
        })
        .or_else(|| addresses.first())
        .cloned()
}

/// "Thanks,\nJane Doe" -> "Jane Doe".
pub fn name(text: &str) -> Option<String> {
    SIGN_OFF_NAME.captures_iter(text).find_map(|caps| {
        let first = caps.get(1)?.as_str();
        let last = caps.get(2)?.as_str();
        let is_sign_off = |word: &str| SIGN_OFF_WORDS.contains(&word.to_ascii_lowercase().as_str());
        (!is_sign_off(first) && !is_sign_off(last)).then(|| format!("{first} {last}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_formats() {
        assert_eq!(phone("Call (214) 555-0199 now").as_deref(), Some("214-555-0199"));
        assert_eq!(phone("cell 469.555.0123").as_deref(), Some("469-555-0123"));
        assert_eq!(phone("+1 312-555-0188").as_deref(), Some("312-555-0188"));
        assert_eq!(phone("Load #4471923"), None);
    }

    #[test]
    fn test_email_prefers_operations_mailbox() {
        let text = "Reply to jane@tql.com or dispatch@tql.com";
        assert_eq!(email(text).as_deref(), Some("dispatch@tql.com"));
        assert_eq!(email("Reach me: Jane@TQL.com").as_deref(), Some("jane@tql.com"));
        assert_eq!(email("no address"), None);
    }

    #[test]
    fn test_name_after_sign_off() {
        assert_eq!(name("Let me know.\nThanks,\nJane Doe\nTQL").as_deref(), Some("Jane Doe"));
        assert_eq!(name("Best Regards,\nMike Smith").as_deref(), Some("Mike Smith"));
        assert_eq!(name("thanks for the load, see you"), None);
    }

    #[test]
    fn test_sign_off_without_comma() {
        assert_eq!(name("Best Regards\nMike Smith").as_deref(), Some("Mike Smith"));
        assert_eq!(name("Kind regards\nAna Ruiz-Lopez").as_deref(), Some("Ana Ruiz-Lopez"));
        assert_eq!(name("Cheers\nThanks Mike"), None);
    }
}
