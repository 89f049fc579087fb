// src/text.rs
// Shared text cleanup for titles and body excerpts.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Decode HTML entities, drop tags, collapse whitespace.
pub fn strip_html(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Bound a body excerpt to `max` characters. Char-based, never splits a
/// multi-byte character.
pub fn excerpt(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
