// =============================================================================
// normalizer.rs — THE MARKUP SHREDDER
// =============================================================================
//
// Broker emails arrive as whatever their TMS felt like generating that day:
// nested tables, inline styles, tracking pixels, and the occasional
// <script> tag nobody can explain. Everything downstream wants one thing:
// plain text, one logical line per row, single spaces.
//
// normalize() is pure and total. Garbage in, slightly cleaner garbage out.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
        .expect("script/style pattern")
});

/// Tags whose boundary means "new line" in the rendered email.
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|tr|li|h[1-6]|table|ul|ol)\s*>").expect("block pattern")
});

/// Cell ends become a plain separator so "Origin:</td><td>Dallas" reads naturally.
static CELL_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("cell pattern"));

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("tag pattern"));

/// `&amp;` is last so "&amp;lt;" decodes to "&lt;" and not "<".
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&#160;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#34;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&rarr;", "→"),
    ("&#8594;", "→"),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&#36;", "$"),
    ("&amp;", "&"),
];

/// Strip markup and decode entities into plain text.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let bytes = raw.as_bytes();
    let has_markup = memchr::memchr(b'<', bytes).is_some();
    let has_entities = memchr::memchr(b'&', bytes).is_some();

    let mut text = raw.replace("\r\n", "\n");

    if has_markup {
        // Source newlines in markup are layout. Only tag-derived breaks survive.
        text = text.replace('\n', " ");
        text = SCRIPT_STYLE.replace_all(&text, " ").into_owned();
        text = BLOCK_BREAK.replace_all(&text, "\n").into_owned();
        text = CELL_BREAK.replace_all(&text, " ").into_owned();
        text = ANY_TAG.replace_all(&text, " ").into_owned();
    }

    if has_entities {
        text = decode_entities(&text);
    }

    collapse_whitespace(&text)
}

fn decode_entities(text: &str) -> String {
    let mut out = text.to_string();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// Collapse runs of spaces/tabs, trim every line, and keep at most one blank
/// line between paragraphs.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let collapsed = line
            .split(|c: char| c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }

        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(&collapsed);
    }

    out
}

/// Build the text every analyzer sees for one message: subject on the first
/// line, then the best body we have (plain text, else normalized markup,
/// else the provider snippet).
pub fn message_text(
    subject: &str,
    body_text: Option<&str>,
    body_html: Option<&str>,
    snippet: Option<&str>,
) -> String {
    let body = match (body_text, body_html) {
        (Some(text), _) if !text.trim().is_empty() => collapse_whitespace(text),
        (_, Some(html)) if !html.trim().is_empty() => normalize(html),
        _ => snippet.map(collapse_whitespace).unwrap_or_default(),
    };

    let subject = collapse_whitespace(subject);
    match (subject.is_empty(), body.is_empty()) {
        (true, _) => body,
        (false, true) => subject,
        (false, false) => format!("{subject}\n{body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_returns_empty() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_scripts_and_styles_are_removed() {
        let html = "<style>.x{color:red}</style><p>Load ready</p><script>track()</script>";
        assert_eq!(normalize(html), "Load ready");
    }

    #[test]
    fn test_block_tags_become_lines_and_cells_become_spaces() {
        let html = "<table><tr><td>Origin:</td><td>Dallas, TX</td></tr>\
                    <tr><td>Destination:</td><td>Atlanta, GA</td></tr></table>";
        assert_eq!(normalize(html), "Origin: Dallas, TX\nDestination: Atlanta, GA");
    }

    #[test]
    fn test_entities_are_decoded_after_tags_are_stripped() {
        let html = "<div>Rate&nbsp;&#36;1,500 &amp; fuel</div><div>&lt;b&gt; stays text</div>";
        assert_eq!(normalize(html), "Rate $1,500 & fuel\n<b> stays text");
    }

    #[test]
    fn test_whitespace_collapses() {
        let text = "  Dallas,   TX \t to Atlanta \n\n\n\n  750   miles  ";
        assert_eq!(collapse_whitespace(text), "Dallas, TX to Atlanta\n\n750 miles");
    }

    #[test]
    fn test_message_text_prefers_plain_body() {
        let text = message_text("Load 12345", Some("plain body"), Some("<p>html body</p>"), None);
        assert_eq!(text, "Load 12345\nplain body");

        let text = message_text("Load 12345", None, Some("<p>html body</p>"), None);
        assert_eq!(text, "Load 12345\nhtml body");

        let text = message_text("", None, None, Some("snippet only"));
        assert_eq!(text, "snippet only");
    }
}
