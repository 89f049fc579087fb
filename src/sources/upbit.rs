// src/sources/upbit.rs
// Upbit notice API. Flat JSON notices with ISO publish times and a
// category string right on the item.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{datetime_to_ms, field_id, field_str, SourceAdapter};
use crate::config::SourceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::text::strip_html;

pub struct Upbit {
    cfg: Arc<SourceConfig>,
    fetcher: Fetcher,
    base: String,
}

impl Upbit {
    pub fn new(cfg: Arc<SourceConfig>, fetcher: Fetcher) -> Self {
        let base = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://upbit.com".to_string());
        Self { cfg, fetcher, base }
    }
}

#[async_trait]
impl SourceAdapter for Upbit {
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
        if raw.get("success").and_then(Value::as_bool) != Some(true) {
            warn!(source = %self.name(), "feed reported failure");
            return Vec::new();
        }
        match raw.pointer("/data/notices").and_then(Value::as_array) {
            Some(notices) => notices.clone(),
            None => {
                warn!(source = %self.name(), "unexpected payload shape");
                Vec::new()
            }
        }
    }

    async fn extract_category(&self, item: &Value) -> String {
        field_str(item, "category")
    }

    fn extract_source_id(&self, item: &Value) -> String {
        field_id(item, &["id"])
    }

    fn extract_title(&self, item: &Value) -> String {
        strip_html(&field_str(item, "title"))
    }

    fn extract_body(&self, item: &Value) -> String {
        // Notices carry no body in the list payload; the title doubles as
        // the extraction text.
        strip_html(&field_str(item, "title"))
    }

    fn extract_timestamp_ms(&self, item: &Value) -> i64 {
        datetime_to_ms(&field_str(item, "listed_at"))
    }

    fn build_url(&self, item: &Value) -> String {
        let id = self.extract_source_id(item);
        format!("{}/service_center/notice?id={id}", self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{test_config, test_fetcher};
    use serde_json::json;

    fn adapter() -> Upbit {
        Upbit::new(
            test_config("upbit", "https://api-manager.upbit.com/api/v1/announcements"),
            test_fetcher(),
        )
    }

    fn payload() -> Value {
        json!({
            "success": true,
            "data": {
                "notices": [
                    {
                        "id": 5150,
                        "title": "Market Support for LEVER(KRW)",
                        "category": "Trade",
                        "listed_at": "1970-01-01T00:00:02+00:00"
                    }
                ]
            }
        })
    }

    #[tokio::test]
    async fn projects_notice_fields() {
        let a = adapter();
        let items = a.extract_items(&payload());
        assert_eq!(items.len(), 1);
        assert_eq!(a.extract_source_id(&items[0]), "5150");
        assert_eq!(a.extract_category(&items[0]).await, "Trade");
        assert_eq!(a.extract_timestamp_ms(&items[0]), 2_000);
        assert_eq!(
            a.build_url(&items[0]),
            "https://upbit.com/service_center/notice?id=5150"
        );
    }

    #[test]
    fn failed_response_yields_no_items() {
        let a = adapter();
        assert!(a.extract_items(&json!({"success": false})).is_empty());
        assert!(a.extract_items(&json!({"success": true, "data": {}})).is_empty());
    }
}
