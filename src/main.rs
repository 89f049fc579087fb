use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listing_sentinel::classify::Classifier;
use listing_sentinel::config::{AppConfig, SourceConfig};
use listing_sentinel::dedup::{DedupStore, MemoryCache, RedisCache, ReservationCache, SqliteStore};
use listing_sentinel::fetch::Fetcher;
use listing_sentinel::notify::{telegram::TelegramNotifier, Notifier, Router};
use listing_sentinel::pipeline::IngestionPipeline;
use listing_sentinel::scheduler::{spawn_source_loop, spawn_stats_loop, Stats};
use listing_sentinel::sources::build_adapter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn init_source(cfg: Arc<SourceConfig>, dedup: Arc<DedupStore>) -> Result<IngestionPipeline> {
    let fetcher = Fetcher::new(&cfg.headers, &cfg.proxies)?;
    let classifier = Classifier::new(&cfg.name, cfg.categories.clone())?;
    let patterns = cfg.compiled_patterns()?;
    let adapter = build_adapter(cfg, fetcher).await?;
    Ok(IngestionPipeline::new(adapter, classifier, patterns, dedup))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    info!(sources = cfg.sources.len(), "starting announcement watcher");

    let cache: Arc<dyn ReservationCache> = if cfg.general.use_memory_cache {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(RedisCache::connect(&cfg.general.redis_url).await?)
    };
    let store = SqliteStore::open(Path::new(&cfg.general.db_path), &cfg.source_names())?;
    let dedup = Arc::new(DedupStore::new(cache, store));

    let router = Arc::new(Router::new(
        cfg.telegram.routes.clone(),
        cfg.telegram.default_thread,
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
        cfg.telegram.bot_token.clone(),
        cfg.telegram.chat_id,
    ));

    let stats = Arc::new(Stats::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut handles = Vec::new();
    for source_cfg in cfg.enabled_sources() {
        let source_cfg = Arc::new(source_cfg.clone());
        // One source failing to come up must not stop the others.
        let pipeline = match init_source(source_cfg.clone(), dedup.clone()).await {
            Ok(p) => p,
            Err(e) => {
                error!(source = %source_cfg.name, error = %e, "source initialization failed");
                continue;
            }
        };
        handles.push(spawn_source_loop(
            pipeline,
            dedup.clone(),
            router.clone(),
            notifier.clone(),
            source_cfg.poll_interval(cfg.general.poll_interval_secs),
            stats.clone(),
            shutdown_rx.clone(),
        ));
    }
    if handles.is_empty() {
        bail!("no sources could be initialized");
    }
    handles.push(spawn_stats_loop(
        stats,
        Duration::from_secs(cfg.general.stats_interval_secs),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}
