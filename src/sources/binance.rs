// src/sources/binance.rs
// Binance CMS article feed. Items arrive grouped by catalog; the catalog
// name is folded into each item so classification sees a flat token.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{field_i64, field_id, field_str, SourceAdapter};
use crate::config::SourceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::text::strip_html;

pub struct Binance {
    cfg: Arc<SourceConfig>,
    fetcher: Fetcher,
    base: String,
}

impl Binance {
    pub fn new(cfg: Arc<SourceConfig>, fetcher: Fetcher) -> Self {
        let base = cfg.base();
        Self { cfg, fetcher, base }
    }
}

#[async_trait]
impl SourceAdapter for Binance {
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
        let Some(catalogs) = raw
            .pointer("/data/catalogs")
            .and_then(Value::as_array)
        else {
            warn!(source = %self.name(), "unexpected payload shape");
            return Vec::new();
        };

        let mut items = Vec::new();
        for catalog in catalogs {
            let catalog_name = field_str(catalog, "catalogName");
            let Some(articles) = catalog.get("articles").and_then(Value::as_array) else {
                continue;
            };
            for article in articles {
                let mut item = article.clone();
                if let Some(obj) = item.as_object_mut() {
                    obj.insert("category".to_string(), Value::String(catalog_name.clone()));
                }
                items.push(item);
            }
        }
        items
    }

    async fn extract_category(&self, item: &Value) -> String {
        field_str(item, "category")
    }

    fn extract_source_id(&self, item: &Value) -> String {
        field_id(item, &["id", "code"])
    }

    fn extract_title(&self, item: &Value) -> String {
        strip_html(&field_str(item, "title"))
    }

    fn extract_body(&self, item: &Value) -> String {
        strip_html(&field_str(item, "body"))
    }

    fn extract_timestamp_ms(&self, item: &Value) -> i64 {
        field_i64(item, "releaseDate")
    }

    fn build_url(&self, item: &Value) -> String {
        let code = field_str(item, "code");
        if code.is_empty() {
            format!("{}/en/support/announcement", self.base)
        } else {
            format!("{}/en/support/announcement/{code}", self.base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{test_config, test_fetcher};
    use serde_json::json;

    fn adapter() -> Binance {
        Binance::new(
            test_config("binance", "https://www.binance.com/bapi/cms/article/list/query"),
            test_fetcher(),
        )
    }

    fn payload() -> Value {
        json!({
            "data": {
                "catalogs": [
                    {
                        "catalogName": "New Cryptocurrency Listing",
                        "articles": [
                            {
                                "id": 101,
                                "code": "abc123",
                                "title": "Binance Will List <b>Arbitrum (ARB)</b>",
                                "body": "<p>Details inside.</p>",
                                "releaseDate": 1700000000000_i64
                            }
                        ]
                    },
                    {
                        "catalogName": "Delisting",
                        "articles": [
                            {
                                "id": 102,
                                "code": "def456",
                                "title": "Notice of Removal",
                                "releaseDate": 1700000001000_i64
                            }
                        ]
                    }
                ]
            }
        })
    }

    #[tokio::test]
    async fn flattens_catalogs_and_injects_category() {
        let a = adapter();
        let items = a.extract_items(&payload());
        assert_eq!(items.len(), 2);
        assert_eq!(a.extract_category(&items[0]).await, "New Cryptocurrency Listing");
        assert_eq!(a.extract_category(&items[1]).await, "Delisting");
    }

    #[test]
    fn projects_fields_and_strips_markup() {
        let a = adapter();
        let items = a.extract_items(&payload());
        assert_eq!(a.extract_source_id(&items[0]), "101");
        assert_eq!(a.extract_title(&items[0]), "Binance Will List Arbitrum (ARB)");
        assert_eq!(a.extract_body(&items[0]), "Details inside.");
        assert_eq!(a.extract_timestamp_ms(&items[0]), 1_700_000_000_000);
        assert_eq!(
            a.build_url(&items[0]),
            "https://www.binance.com/en/support/announcement/abc123"
        );
    }

    #[test]
    fn malformed_payload_yields_no_items() {
        let a = adapter();
        assert!(a.extract_items(&json!({"data": {}})).is_empty());
        assert!(a.extract_items(&json!("nope")).is_empty());
    }
}
