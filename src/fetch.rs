// src/fetch.rs
// Per-source HTTP plumbing: owned client pool, proxy rotation, bounded
// retry with exponential backoff, and a typed retryable/non-retryable
// error split.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Fixed per-call timeout for every upstream request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 4_000;
const ERROR_PREVIEW_CHARS: usize = 500;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/139.0.0.0 Safari/537.36";

/// Placeholder in configured endpoints that is resolved once at adapter
/// build time against the page's Next.js build id.
pub const NAVIGATION_ID_PLACEHOLDER: &str = "{navigation_id}";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    Status {
        status: u16,
        url: String,
        preview: String,
    },
    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Transport failures and throttling/server statuses are worth
    /// retrying; client errors and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Decode(_) => false,
        }
    }
}

/// `scheme://host` portion of a URL.
pub fn base_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let host_start = scheme_end + 3;
        let end = url[host_start..]
            .find('/')
            .map(|i| host_start + i)
            .unwrap_or(url.len());
        return url[..end].to_string();
    }
    url.to_string()
}

fn backoff_ms(attempt: u32) -> u64 {
    (BACKOFF_BASE_MS << (attempt - 1)).min(BACKOFF_CAP_MS)
}

fn preview(body: &str) -> String {
    if body.chars().count() <= ERROR_PREVIEW_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(ERROR_PREVIEW_CHARS).collect();
    format!("{cut}... [truncated, total {} chars]", body.chars().count())
}

/// One fetcher per source. Transport state (headers, proxies) is never
/// shared across sources; each proxy in the pool gets its own client and
/// selection rotates round-robin, one pick per request cycle.
pub struct Fetcher {
    clients: Vec<Client>,
    next: AtomicUsize,
}

impl Fetcher {
    pub fn new(headers: &HashMap<String, String>, proxies: &[String]) -> Result<Self> {
        let mut header_map = HeaderMap::new();
        header_map.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_USER_AGENT),
        );
        for (k, v) in headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .with_context(|| format!("invalid header name {k:?}"))?;
            let value =
                HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
            header_map.insert(name, value);
        }

        let build = |proxy: Option<&str>| -> Result<Client> {
            let mut builder = Client::builder()
                .default_headers(header_map.clone())
                .timeout(REQUEST_TIMEOUT);
            if let Some(p) = proxy {
                builder = builder.proxy(
                    reqwest::Proxy::all(p).with_context(|| format!("invalid proxy url {p:?}"))?,
                );
            }
            builder.build().context("building http client")
        };

        let clients = if proxies.is_empty() {
            vec![build(None)?]
        } else {
            proxies
                .iter()
                .map(|p| build(Some(p)))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    fn client(&self) -> &Client {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        &self.clients[i % self.clients.len()]
    }

    /// One round trip with the retry policy applied: up to 3 attempts,
    /// exponential backoff 0.5s doubling, capped at 4s, retryable errors
    /// only. The proxy/client is chosen once for all attempts of the call.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<String, FetchError> {
        let client = self.client();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match Self::try_request(client, method, url, query, body).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                    warn!(url, attempt, error = %e, "retrying fetch");
                    tokio::time::sleep(Duration::from_millis(backoff_ms(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn request_json(
        &self,
        method: &str,
        url: &str,
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<Value, FetchError> {
        let text = self.request(method, url, query, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn try_request(
        client: &Client,
        method: &str,
        url: &str,
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<String, FetchError> {
        let method = if method.eq_ignore_ascii_case("post") {
            Method::POST
        } else {
            Method::GET
        };

        let mut req = client.request(method, url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(json) = body {
            req = req.json(json);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                preview: preview(&text),
            });
        }
        Ok(text)
    }

    /// Resolve a `{navigation_id}` placeholder by fetching the page root and
    /// locating the Next.js build manifest. Falls back to the URL as-is if
    /// the build id cannot be found.
    pub async fn resolve_navigation_url(&self, api_url: &str) -> Result<String, FetchError> {
        if !api_url.contains(NAVIGATION_ID_PLACEHOLDER) {
            return Ok(api_url.to_string());
        }

        let page_url = api_url.split("/_next/").next().unwrap_or(api_url);
        let html = self.request("get", page_url, &HashMap::new(), None).await?;

        static RE_BUILD_ID: OnceCell<Regex> = OnceCell::new();
        let re = RE_BUILD_ID
            .get_or_init(|| Regex::new(r"/_next/static/([^/]+)/_buildManifest\.js").unwrap());

        match re.captures(&html).and_then(|c| c.get(1)) {
            Some(build_id) => {
                Ok(api_url.replace(NAVIGATION_ID_PLACEHOLDER, build_id.as_str()))
            }
            None => {
                warn!(url = page_url, "build id not found, keeping endpoint as-is");
                Ok(api_url.to_string())
            }
        }
    }
}
