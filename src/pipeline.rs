// src/pipeline.rs
// Per-source ingestion: fetch a batch, walk it newest-first, and stop at
// the first item that is already known. Everything before the stop point
// is normalized into canonical announcements.

use std::cmp::Reverse;
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::classify::Classifier;
use crate::dedup::DedupStore;
use crate::model::Announcement;
use crate::sources::SourceAdapter;
use crate::text;
use crate::ticker;

/// Stored body excerpts are capped at this many characters.
pub const BODY_EXCERPT_CHARS: usize = 500;

pub struct IngestionPipeline {
    adapter: Box<dyn SourceAdapter>,
    classifier: Classifier,
    patterns: Vec<Regex>,
    store: Arc<DedupStore>,
}

impl IngestionPipeline {
    pub fn new(
        adapter: Box<dyn SourceAdapter>,
        classifier: Classifier,
        patterns: Vec<Regex>,
        store: Arc<DedupStore>,
    ) -> Self {
        Self {
            adapter,
            classifier,
            patterns,
            store,
        }
    }

    pub fn source(&self) -> &str {
        self.adapter.name()
    }

    /// One poll cycle: returns the unseen announcements (newest first) and
    /// the total number of items the feed returned.
    ///
    /// The cutoff walk stops at the first item that is strictly older than
    /// the known latest timestamp OR already present in the durable store.
    /// The id check is what catches an unseen sibling sharing the exact
    /// timestamp of the newest known item.
    pub async fn fetch_latest(&self) -> Result<(Vec<Announcement>, usize)> {
        let raw = self.adapter.fetch().await?;
        let mut items = self.adapter.extract_items(&raw);
        let total = items.len();
        items.sort_by_key(|item| Reverse(self.adapter.extract_timestamp_ms(item)));

        let latest_known = self.store.latest_ms(self.source()).await?.unwrap_or(0);

        let mut fresh = Vec::new();
        for item in &items {
            let Some(ann) = self.parse_announcement(item).await else {
                debug!(source = self.source(), "skipping item without source id");
                continue;
            };
            if ann.published_at_ms < latest_known
                || self.store.exists(&ann.source, &ann.source_id).await
            {
                break;
            }
            fresh.push(ann);
        }
        Ok((fresh, total))
    }

    async fn parse_announcement(&self, item: &Value) -> Option<Announcement> {
        let source_id = self.adapter.extract_source_id(item);
        if source_id.is_empty() {
            return None;
        }

        let title = self.adapter.extract_title(item);
        let body = self.adapter.extract_body(item);

        // Title patterns take precedence; the feed's own category token is
        // only consulted (possibly via a secondary fetch) when none match.
        let category = match self.classifier.classify_title(&title) {
            Some(mapping) => mapping,
            None => {
                let token = self.adapter.extract_category(item).await;
                self.classifier.classify(&token)
            }
        };

        let tickers = ticker::extract_tickers(&title, &body, &self.patterns);
        let body_clean = text::strip_html(&body);
        let body_text =
            (!body_clean.is_empty()).then(|| text::excerpt(&body_clean, BODY_EXCERPT_CHARS));

        Some(Announcement {
            source: self.source().to_string(),
            source_id,
            tickers,
            title,
            url: self.adapter.build_url(item),
            published_at_ms: self.adapter.extract_timestamp_ms(item),
            body_text,
            kind: category.kind(),
            category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{MemoryCache, SqliteStore};
    use crate::fetch::FetchError;
    use crate::sources::{field_i64, field_str};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAdapter {
        items: Vec<Value>,
        parsed: Arc<AtomicUsize>,
    }

    impl FakeAdapter {
        fn new(items: &[(&str, i64)]) -> (Self, Arc<AtomicUsize>) {
            let parsed = Arc::new(AtomicUsize::new(0));
            let items = items
                .iter()
                .map(|(id, ts)| json!({"id": id, "ts": ts, "title": format!("item {id}")}))
                .collect();
            (
                Self {
                    items,
                    parsed: parsed.clone(),
                },
                parsed,
            )
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn name(&self) -> &str {
            "binance"
        }
        async fn fetch(&self) -> Result<Value, FetchError> {
            Ok(json!({"items": self.items}))
        }
        fn extract_items(&self, raw: &Value) -> Vec<Value> {
            raw["items"].as_array().cloned().unwrap_or_default()
        }
        async fn extract_category(&self, _item: &Value) -> String {
            String::new()
        }
        fn extract_source_id(&self, item: &Value) -> String {
            self.parsed.fetch_add(1, Ordering::SeqCst);
            field_str(item, "id")
        }
        fn extract_title(&self, item: &Value) -> String {
            field_str(item, "title")
        }
        fn extract_body(&self, _item: &Value) -> String {
            String::new()
        }
        fn extract_timestamp_ms(&self, item: &Value) -> i64 {
            field_i64(item, "ts")
        }
        fn build_url(&self, item: &Value) -> String {
            format!("https://example.com/{}", field_str(item, "id"))
        }
    }

    fn dedup() -> Arc<DedupStore> {
        Arc::new(DedupStore::new(
            Arc::new(MemoryCache::new()),
            SqliteStore::open_in_memory(&["binance".to_string()]).unwrap(),
        ))
    }

    fn pipeline(adapter: FakeAdapter, store: Arc<DedupStore>) -> IngestionPipeline {
        IngestionPipeline::new(
            Box::new(adapter),
            Classifier::new("binance", vec![]).unwrap(),
            vec![],
            store,
        )
    }

    #[tokio::test]
    async fn fresh_source_takes_every_item() {
        let store = dedup();
        let (adapter, _) = FakeAdapter::new(&[("c", 100), ("a", 300), ("b", 200)]);
        let p = pipeline(adapter, store.clone());

        let (fresh, total) = p.fetch_latest().await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(fresh.len(), 3);
        // Newest first after the sort.
        assert_eq!(fresh[0].source_id, "a");

        store.filter_and_persist(fresh).await;
        assert_eq!(store.latest_ms("binance").await.unwrap(), Some(300));
    }

    #[tokio::test]
    async fn cutoff_stops_before_older_items() {
        let store = dedup();
        let (seed, _) = FakeAdapter::new(&[("i1000", 1000)]);
        let p = pipeline(seed, store.clone());
        let (fresh, _) = p.fetch_latest().await.unwrap();
        store.filter_and_persist(fresh).await;

        let (adapter, parsed) =
            FakeAdapter::new(&[("n1", 1200), ("n2", 1100), ("i1000", 1000), ("old", 900)]);
        let p = pipeline(adapter, store.clone());
        let (fresh, total) = p.fetch_latest().await.unwrap();

        assert_eq!(total, 4);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].source_id, "n1");
        assert_eq!(fresh[1].source_id, "n2");
        // The walk stopped at the known id; the oldest item was never parsed.
        assert_eq!(parsed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn same_timestamp_sibling_is_still_picked_up() {
        let store = dedup();
        let (seed, _) = FakeAdapter::new(&[("a", 1000)]);
        let p = pipeline(seed, store.clone());
        let (fresh, _) = p.fetch_latest().await.unwrap();
        store.filter_and_persist(fresh).await;

        // "b" shares the latest timestamp but has an unseen id.
        let (adapter, _) = FakeAdapter::new(&[("b", 1000), ("a", 1000)]);
        let p = pipeline(adapter, store.clone());
        let (fresh, _) = p.fetch_latest().await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].source_id, "b");
    }

    #[tokio::test]
    async fn items_without_ids_are_skipped_not_fatal() {
        let store = dedup();
        let (adapter, _) = FakeAdapter::new(&[("", 300), ("ok", 200)]);
        let p = pipeline(adapter, store);
        let (fresh, total) = p.fetch_latest().await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].source_id, "ok");
    }
}
