// src/sources/bithumb.rs
// Bithumb notice feed behind a Next.js data route. The endpoint embeds a
// build id that rotates on deploy, so the configured URL carries a
// placeholder resolved once when the adapter is built.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{datetime_to_ms, field_id, field_str, SourceAdapter};
use crate::config::SourceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::text::strip_html;

pub struct Bithumb {
    cfg: Arc<SourceConfig>,
    fetcher: Fetcher,
    api_url: String,
    base: String,
}

impl Bithumb {
    /// Resolves the `{navigation_id}` placeholder against the live page.
    /// Failure here fails only this source's initialization.
    pub async fn build(cfg: Arc<SourceConfig>, fetcher: Fetcher) -> anyhow::Result<Self> {
        let api_url = fetcher.resolve_navigation_url(&cfg.api_url).await?;
        let base = cfg.base();
        Ok(Self {
            cfg,
            fetcher,
            api_url,
            base,
        })
    }
}

#[async_trait]
impl SourceAdapter for Bithumb {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn fetch(&self) -> Result<Value, FetchError> {
        self.fetcher
            .request_json(
                &self.cfg.method,
                &self.api_url,
                &self.cfg.query,
                self.cfg.body.as_ref(),
            )
            .await
    }

    fn extract_items(&self, raw: &Value) -> Vec<Value> {
        match raw.pointer("/pageProps/noticeList").and_then(Value::as_array) {
            Some(notices) => notices.clone(),
            None => {
                warn!(source = %self.name(), "unexpected payload shape");
                Vec::new()
            }
        }
    }

    async fn extract_category(&self, item: &Value) -> String {
        field_str(item, "categoryName1")
    }

    fn extract_source_id(&self, item: &Value) -> String {
        field_id(item, &["id"])
    }

    fn extract_title(&self, item: &Value) -> String {
        strip_html(&field_str(item, "title"))
    }

    fn extract_body(&self, item: &Value) -> String {
        strip_html(&field_str(item, "title"))
    }

    fn extract_timestamp_ms(&self, item: &Value) -> i64 {
        // Naive local datetime, e.g. "2024-03-01 12:30:00".
        datetime_to_ms(&field_str(item, "publicationDateTime"))
    }

    fn build_url(&self, item: &Value) -> String {
        let id = self.extract_source_id(item);
        format!("{}/notice/{id}", self.base)
    }
}
