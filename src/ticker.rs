// src/ticker.rs
// Pure ticker extraction from announcement text. No network, no store.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Hard cap on tickers per announcement.
pub const MAX_TICKERS: usize = 10;

const MIN_LEN: usize = 1;
const MAX_LEN: usize = 12;

/// Quote currencies that get stripped when they trail a candidate.
const QUOTE_SUFFIXES: &[&str] = &["USDT", "USDC", "USD"];

/// Common false positives: quote currencies, exchange names, trading nouns.
static BLACKLIST: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "AND", "OR", "THE", "ON", "WILL", "LAUNCH", "NEW", "LIST", "LISTS", "LISTING", "SPOT",
        "FUTURES", "PERPETUAL", "PERP", "CONTRACT", "TRADING", "MARGIN", "MARGINED", "BOTS",
        "COIN", "TOKEN", "PAIR", "ALPHA", "BETA", "USDT", "USDC", "USD", "BTC", "ETH", "BNB",
        "KRW", "BINANCE", "BYBIT", "OKX", "UPBIT", "BITHUMB",
    ]
    .into_iter()
    .collect()
});

/// Universal pattern set, used when a source has no overrides configured.
/// Each capture group is a ticker candidate.
static DEFAULT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Symbols in parentheses: (BTC), (WBTC), (Q)
        r"\(([A-Z0-9]{1,12})\)",
        // Concatenated pairs: LEVERUSDT, SOLUSDTM
        r"(?i)\b([A-Z0-9]{2,12})USDT[M]?\b",
        // Slash pairs: XXX/USDT, XXX／USD
        r"(?i)\b([A-Z0-9]{2,12})[/／](?:USDT|USDC|USD)\b",
        // Listing verbs followed by a symbol
        r"(?i)\b(?:will list|listing|lists?|launch(?:es|ed|ing)?|add(?:s|ed|ing)?|support(?:s|ed|ing)?)\s+([A-Z0-9]{2,12})\b",
        // Symbol pairs joined by "and"/"&"
        r"\b([A-Z0-9]{2,8})\s*(?:&|and|And|AND)\s*([A-Z0-9]{2,8})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("default ticker pattern"))
    .collect()
});

/// Extract asset symbols from title + body. Applies every pattern, cleans
/// each candidate (suffix strip, blacklist, digit-only rejection), returns
/// the sorted, deduplicated set capped at [`MAX_TICKERS`].
pub fn extract_tickers(title: &str, body: &str, overrides: &[Regex]) -> Vec<String> {
    let text = if body.is_empty() {
        title.to_string()
    } else {
        format!("{title} {body}")
    };

    let patterns: &[Regex] = if overrides.is_empty() {
        &DEFAULT_PATTERNS
    } else {
        overrides
    };

    let mut found = BTreeSet::new();
    for re in patterns {
        for caps in re.captures_iter(&text) {
            for group in caps.iter().skip(1).flatten() {
                if let Some(ticker) = clean_candidate(group.as_str()) {
                    found.insert(ticker);
                }
            }
        }
    }

    found.into_iter().take(MAX_TICKERS).collect()
}

/// Normalize one candidate: uppercase, strip a trailing quote currency,
/// reject digits-only, length outliers and blacklisted terms. Stable under
/// re-application.
fn clean_candidate(raw: &str) -> Option<String> {
    let mut tok = raw.trim().to_ascii_uppercase();

    for suffix in QUOTE_SUFFIXES {
        if tok.len() > suffix.len() {
            if let Some(base) = tok.strip_suffix(suffix) {
                tok = base.to_string();
                break;
            }
        }
    }

    if tok.len() < MIN_LEN || tok.len() > MAX_LEN {
        return None;
    }
    if tok.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !tok.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if BLACKLIST.contains(tok.as_str()) {
        return None;
    }
    Some(tok)
}
