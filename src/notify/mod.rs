// src/notify/mod.rs
// Notification boundary: routing rules, message formatting, and the
// delivery trait. Dedup has already happened upstream, so at-least-once
// delivery to the sink is acceptable.

pub mod telegram;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{Announcement, AnnouncementKind};

/// One ordered routing rule. Empty lists match everything, so a rule with
/// only `kinds` set routes that kind from any source.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRule {
    #[serde(default)]
    pub name: Option<String>,
    pub thread_id: i64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl RouteRule {
    fn matches(&self, ann: &Announcement) -> bool {
        if !self.sources.is_empty()
            && !self
                .sources
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&ann.source))
        {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| k == ann.kind.as_str()) {
            return false;
        }
        if !self.categories.is_empty()
            && !self.categories.iter().any(|c| {
                c.eq_ignore_ascii_case(&ann.category.internal_name)
                    || c.eq_ignore_ascii_case(&ann.category.show_name)
            })
        {
            return false;
        }
        true
    }
}

/// Decides the destination thread for a record: first matching rule wins,
/// otherwise the default destination.
pub struct Router {
    rules: Vec<RouteRule>,
    default_thread: i64,
}

impl Router {
    pub fn new(rules: Vec<RouteRule>, default_thread: i64) -> Self {
        Self {
            rules,
            default_thread,
        }
    }

    pub fn destination(&self, ann: &Announcement) -> i64 {
        self.rules
            .iter()
            .find(|r| r.matches(ann))
            .map(|r| r.thread_id)
            .unwrap_or(self.default_thread)
    }
}

/// Telegram-HTML rendering of one announcement: linked, with the category
/// display name and a capped ticker list for listing-type records.
pub fn format_message(ann: &Announcement) -> String {
    let source = capitalize(&ann.source);
    let action = capwords(&ann.category.show_name.replace('_', " "));

    let mut msg = format!("<b>{source}</b> [{action}]");

    if matches!(
        ann.kind,
        AnnouncementKind::ListingSpot
            | AnnouncementKind::ListingFutures
            | AnnouncementKind::Delisting
    ) && !ann.tickers.is_empty()
    {
        let mut tickers: String = ann.tickers[..ann.tickers.len().min(3)]
            .iter()
            .map(|t| format!("${t}"))
            .collect::<Vec<_>>()
            .join(", ");
        if ann.tickers.len() > 3 {
            tickers.push_str(&format!(" +{} more", ann.tickers.len() - 3));
        }
        msg.push(' ');
        msg.push_str(&tickers);
    }

    msg.push_str(&format!(": {}", ann.title));
    format!("<a href='{}'>{}</a>", ann.url, msg)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn capwords(s: &str) -> String {
    s.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Delivery boundary consumed by the scheduler. Implementations report
/// failure via `false`; the pipeline never retries past this point.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, thread_id: i64, text: &str) -> bool;
}
