// src/config.rs
// Startup-time configuration. Loaded once; immutable afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::model::CategoryMapping;
use crate::notify::RouteRule;

pub const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/sentinel.toml";
const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

fn default_true() -> bool {
    true
}
fn default_method() -> String {
    "get".to_string()
}
fn default_db_path() -> String {
    "announcements.db".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_poll_interval() -> u64 {
    60
}
fn default_stats_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Run the fast tier in-process instead of against redis.
    #[serde(default = "default_true")]
    pub use_memory_cache: bool,
    /// Fallback polling interval for sources without their own.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            redis_url: default_redis_url(),
            use_memory_cache: true,
            poll_interval_secs: default_poll_interval(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    /// May be left empty in the file and supplied via TELEGRAM_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: i64,
    #[serde(default)]
    pub default_thread: i64,
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// Static per-source configuration: endpoint, request shape, transport
/// pools, cadence, and all classification/extraction data.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_url: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub proxies: Vec<String>,
    /// Query parameters sent on every poll.
    #[serde(default)]
    pub query: HashMap<String, String>,
    /// JSON body for POST-style feeds.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub categories: Vec<CategoryMapping>,
    /// Ticker-extraction pattern overrides; empty means the universal set.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl SourceConfig {
    pub fn base(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| crate::fetch::base_url(&self.api_url))
    }

    pub fn poll_interval(&self, fallback_secs: u64) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(fallback_secs))
    }

    pub fn compiled_patterns(&self) -> Result<Vec<Regex>> {
        self.patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("{}: bad ticker pattern {p:?}", self.name)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl AppConfig {
    /// Load from $SENTINEL_CONFIG, falling back to `config/sentinel.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Ok(token) = std::env::var(ENV_BOT_TOKEN) {
            if !token.is_empty() {
                cfg.telegram.bot_token = token;
            }
        }
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;
        for (name, source) in &mut cfg.sources {
            source.name = name.to_lowercase();
        }
        Ok(cfg)
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.values().filter(|s| s.enabled)
    }

    /// All configured source names, used to lay out the durable store.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.values().map(|s| s.name.clone()).collect()
    }
}
