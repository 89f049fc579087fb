// src/sources/bybit.rs
// Bybit announcement search endpoint (POST). Hits carry a nested category
// object and second-resolution publish times.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{field_i64, field_str, SourceAdapter};
use crate::config::SourceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::text::strip_html;

pub struct Bybit {
    cfg: Arc<SourceConfig>,
    fetcher: Fetcher,
    base: String,
}

impl Bybit {
    pub fn new(cfg: Arc<SourceConfig>, fetcher: Fetcher) -> Self {
        let base = cfg.base();
        Self { cfg, fetcher, base }
    }
}

#[async_trait]
impl SourceAdapter for Bybit {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn fetch(&self) -> Result<Value, FetchError> {
        self.fetcher
            .request_json(
                &self.cfg.method,
                &self.cfg.api_url,
                &self.cfg.query,
                self.cfg.body.as_ref(),
            )
            .await
    }

    fn extract_items(&self, raw: &Value) -> Vec<Value> {
        match raw.pointer("/result/hits").and_then(Value::as_array) {
            Some(hits) => hits.clone(),
            None => {
                warn!(source = %self.name(), "unexpected payload shape");
                Vec::new()
            }
        }
    }

    async fn extract_category(&self, item: &Value) -> String {
        item.pointer("/category/title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn extract_source_id(&self, item: &Value) -> String {
        field_str(item, "objectID")
    }

    fn extract_title(&self, item: &Value) -> String {
        strip_html(&field_str(item, "title"))
    }

    fn extract_body(&self, item: &Value) -> String {
        strip_html(&field_str(item, "description"))
    }

    fn extract_timestamp_ms(&self, item: &Value) -> i64 {
        field_i64(item, "publish_time") * 1_000
    }

    fn build_url(&self, item: &Value) -> String {
        let path = field_str(item, "url");
        if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{test_config, test_fetcher};
    use serde_json::json;

    fn adapter() -> Bybit {
        Bybit::new(
            test_config("bybit", "https://announcements.bybit.com/x-api/announcements/api/search/v1/index/announcement-posts_en-us"),
            test_fetcher(),
        )
    }

    fn payload() -> Value {
        json!({
            "result": {
                "hits": [
                    {
                        "objectID": "hit-1",
                        "title": "New Listing: LEVER/USDT",
                        "description": "Trading opens soon",
                        "publish_time": 1_700_000_000,
                        "url": "/en/announcement-info/lever",
                        "category": {"title": "New Listings", "key": "new_crypto"}
                    }
                ]
            }
        })
    }

    #[tokio::test]
    async fn projects_hit_fields() {
        let a = adapter();
        let items = a.extract_items(&payload());
        assert_eq!(items.len(), 1);
        assert_eq!(a.extract_source_id(&items[0]), "hit-1");
        assert_eq!(a.extract_category(&items[0]).await, "New Listings");
        assert_eq!(a.extract_timestamp_ms(&items[0]), 1_700_000_000_000);
        assert_eq!(
            a.build_url(&items[0]),
            "https://announcements.bybit.com/en/announcement-info/lever"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        let a = adapter();
        let item = json!({"url": "https://elsewhere.example/post"});
        assert_eq!(a.build_url(&item), "https://elsewhere.example/post");
    }

    #[test]
    fn malformed_payload_yields_no_items() {
        let a = adapter();
        assert!(a.extract_items(&json!({"result": 1})).is_empty());
    }
}
