#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use listing_sentinel::classify::Classifier;
use listing_sentinel::dedup::{DedupStore, MemoryCache, SqliteStore};
use listing_sentinel::fetch::FetchError;
use listing_sentinel::notify::Notifier;
use listing_sentinel::pipeline::IngestionPipeline;
use listing_sentinel::sources::SourceAdapter;

/// Scripted source: serves a fixed item list, or a 500 when `failing`.
pub struct FakeAdapter {
    name: String,
    items: Vec<Value>,
    failing: bool,
}

impl FakeAdapter {
    pub fn new(name: &str, items: &[(&str, i64)]) -> Self {
        let items = items
            .iter()
            .map(|(id, ts)| json!({"id": id, "ts": ts, "title": format!("Will list {id}")}))
            .collect();
        Self {
            name: name.to_string(),
            items,
            failing: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Value, FetchError> {
        if self.failing {
            return Err(FetchError::Status {
                status: 500,
                url: "https://example.com/feed".to_string(),
                preview: String::new(),
            });
        }
        Ok(json!({"items": self.items}))
    }

    fn extract_items(&self, raw: &Value) -> Vec<Value> {
        raw["items"].as_array().cloned().unwrap_or_default()
    }

    async fn extract_category(&self, _item: &Value) -> String {
        String::new()
    }

    fn extract_source_id(&self, item: &Value) -> String {
        item["id"].as_str().unwrap_or_default().to_string()
    }

    fn extract_title(&self, item: &Value) -> String {
        item["title"].as_str().unwrap_or_default().to_string()
    }

    fn extract_body(&self, _item: &Value) -> String {
        String::new()
    }

    fn extract_timestamp_ms(&self, item: &Value) -> i64 {
        item["ts"].as_i64().unwrap_or(0)
    }

    fn build_url(&self, item: &Value) -> String {
        format!("https://example.com/{}", self.extract_source_id(item))
    }
}

/// Counts deliveries instead of talking to Telegram.
#[derive(Default)]
pub struct CountingNotifier {
    pub delivered: AtomicUsize,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn deliver(&self, _thread_id: i64, _text: &str) -> bool {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        true
    }
}

pub fn dedup_for(sources: &[&str]) -> Arc<DedupStore> {
    let names: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
    Arc::new(DedupStore::new(
        Arc::new(MemoryCache::new()),
        SqliteStore::open_in_memory(&names).unwrap(),
    ))
}

pub fn pipeline_for(adapter: FakeAdapter, dedup: Arc<DedupStore>) -> IngestionPipeline {
    let classifier = Classifier::new(adapter.name(), vec![]).unwrap();
    IngestionPipeline::new(Box::new(adapter), classifier, vec![], dedup)
}
