// src/sources/mod.rs
// The polymorphic per-source scraper contract and its registry. One
// concrete adapter per exchange; the set is closed and selected by name
// at startup.

pub mod binance;
pub mod bithumb;
pub mod bybit;
pub mod okx;
pub mod upbit;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::fetch::{FetchError, Fetcher};

/// Capability set every source implements. `fetch` may fail transiently
/// (surfaced to the scheduler after retry exhaustion); `extract_items`
/// must tolerate malformed payloads by returning an empty list; the field
/// projections are pure; `extract_category` may perform a best-effort
/// secondary fetch and degrades to an empty token on failure.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Value, FetchError>;
    fn extract_items(&self, raw: &Value) -> Vec<Value>;
    async fn extract_category(&self, item: &Value) -> String;
    fn extract_source_id(&self, item: &Value) -> String;
    fn extract_title(&self, item: &Value) -> String;
    fn extract_body(&self, item: &Value) -> String;
    fn extract_timestamp_ms(&self, item: &Value) -> i64;
    fn build_url(&self, item: &Value) -> String;
}

/// Name → constructor registry. An unknown name fails only this source's
/// initialization, never the process.
pub async fn build_adapter(
    cfg: Arc<SourceConfig>,
    fetcher: Fetcher,
) -> Result<Box<dyn SourceAdapter>> {
    match cfg.name.as_str() {
        "binance" => Ok(Box::new(binance::Binance::new(cfg, fetcher))),
        "bybit" => Ok(Box::new(bybit::Bybit::new(cfg, fetcher))),
        "okx" => Ok(Box::new(okx::Okx::new(cfg, fetcher))),
        "upbit" => Ok(Box::new(upbit::Upbit::new(cfg, fetcher))),
        "bithumb" => Ok(Box::new(bithumb::Bithumb::build(cfg, fetcher).await?)),
        other => bail!("unknown source: {other}"),
    }
}

pub(crate) fn field_str(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn field_i64(item: &Value, key: &str) -> i64 {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// First non-empty id among `keys`; numeric ids are stringified.
pub(crate) fn field_id(item: &Value, keys: &[&str]) -> String {
    for key in keys {
        match item.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// Parse the timestamp formats the feeds use into epoch milliseconds:
/// RFC 3339, minute-precision ISO with offset, or a naive datetime.
/// Unparseable input yields 0 so ordering pushes the item to the batch end.
pub(crate) fn datetime_to_ms(s: &str) -> i64 {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis();
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
        return dt.timestamp_millis();
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc().timestamp_millis();
    }
    0
}

#[cfg(test)]
pub(crate) fn test_config(name: &str, api_url: &str) -> Arc<SourceConfig> {
    Arc::new(SourceConfig {
        name: name.to_string(),
        enabled: true,
        api_url: api_url.to_string(),
        base_url: None,
        method: "get".to_string(),
        headers: Default::default(),
        proxies: Vec::new(),
        query: Default::default(),
        body: None,
        poll_interval_secs: None,
        categories: Vec::new(),
        patterns: Vec::new(),
    })
}

#[cfg(test)]
pub(crate) fn test_fetcher() -> Fetcher {
    Fetcher::new(&Default::default(), &[]).unwrap()
}
