// src/sources/okx.rs
// OKX ships its announcement list as server-side state embedded in the
// help-center HTML. The list page carries no usable category, so the
// category token comes from a best-effort fetch of the article page; a
// failure there degrades to an empty token and the title patterns carry
// the classification.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::{datetime_to_ms, field_i64, field_id, field_str, SourceAdapter};
use crate::config::SourceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::text::strip_html;

fn app_state_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<script[^>]*id="appState"[^>]*>(.*?)</script>"#).unwrap()
    })
}

fn ssr_data_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<script[^>]*data-id="__app_data_for_ssr__"[^>]*>(.*?)</script>"#)
            .unwrap()
    })
}

fn embedded_json(html: &str, re: &Regex) -> Option<Value> {
    let raw = re.captures(html)?.get(1)?.as_str();
    serde_json::from_str(raw).ok()
}

pub struct Okx {
    cfg: Arc<SourceConfig>,
    fetcher: Fetcher,
    base: String,
}

impl Okx {
    pub fn new(cfg: Arc<SourceConfig>, fetcher: Fetcher) -> Self {
        let base = cfg.base();
        Self { cfg, fetcher, base }
    }
}

#[async_trait]
impl SourceAdapter for Okx {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    /// The raw payload here is the page HTML; decoding happens in
    /// `extract_items` so a shape change degrades to an empty batch
    /// instead of a poll error.
    async fn fetch(&self) -> Result<Value, FetchError> {
        let html = self
            .fetcher
            .request(
                &self.cfg.method,
                &self.cfg.api_url,
                &self.cfg.query,
                self.cfg.body.as_ref(),
            )
            .await?;
        Ok(Value::String(html))
    }

    fn extract_items(&self, raw: &Value) -> Vec<Value> {
        let Some(html) = raw.as_str() else {
            return Vec::new();
        };
        let Some(state) = embedded_json(html, app_state_re()) else {
            warn!(source = %self.name(), "app state not found in page");
            return Vec::new();
        };
        let Some(list) = state
            .pointer("/appContext/initialProps/sectionData/articleList/items")
            .and_then(Value::as_array)
        else {
            warn!(source = %self.name(), "article list missing from app state");
            return Vec::new();
        };

        list.iter()
            .map(|article| {
                let mut item = article.clone();
                // Normalize publishTime to epoch milliseconds up front.
                if let Some(iso) = item.get("publishTime").and_then(Value::as_str) {
                    let ms = datetime_to_ms(iso);
                    if let Some(obj) = item.as_object_mut() {
                        obj.insert("publishTime".to_string(), Value::from(ms));
                    }
                }
                item
            })
            .collect()
    }

    async fn extract_category(&self, item: &Value) -> String {
        let slug = field_str(item, "slug");
        if slug.is_empty() {
            return String::new();
        }
        let url = format!("{}/help/{slug}", self.base);
        let html = match self.fetcher.request("get", &url, &HashMap::new(), None).await {
            Ok(html) => html,
            Err(e) => {
                warn!(source = %self.name(), url, error = %e, "category lookup failed");
                return String::new();
            }
        };
        embedded_json(&html, ssr_data_re())
            .and_then(|data| {
                data.pointer("/appContext/serverSideProps/currentPost/section/title")
                    .and_then(Value::as_str)
                    .map(|t| t.to_lowercase())
            })
            .unwrap_or_default()
    }

    fn extract_source_id(&self, item: &Value) -> String {
        field_id(item, &["id", "slug"])
    }

    fn extract_title(&self, item: &Value) -> String {
        strip_html(&field_str(item, "title"))
    }

    fn extract_body(&self, _item: &Value) -> String {
        // The list payload carries titles only.
        String::new()
    }

    fn extract_timestamp_ms(&self, item: &Value) -> i64 {
        field_i64(item, "publishTime")
    }

    fn build_url(&self, item: &Value) -> String {
        let slug = field_str(item, "slug");
        if slug.is_empty() {
            return String::new();
        }
        format!("{}/help/{slug}", self.base)
    }
}
