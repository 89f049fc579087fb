// src/dedup/mod.rs
pub mod cache;
pub mod store;

pub use cache::{MemoryCache, RedisCache, ReservationCache, LATEST_TTL, RESERVATION_TTL};
pub use store::SqliteStore;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::model::Announcement;

/// Two-tier deduplication: pipelined fast-tier reservation, then a
/// transactional durable insert. A record is only handed downstream once
/// it has survived the durable tier; the fast tier may be lost and reset
/// without breaking correctness beyond re-checking the durable tier.
pub struct DedupStore {
    cache: Arc<dyn ReservationCache>,
    store: SqliteStore,
}

impl DedupStore {
    pub fn new(cache: Arc<dyn ReservationCache>, store: SqliteStore) -> Self {
        Self { cache, store }
    }

    /// Admit a batch (all from one source, newest-first): reserve ids in one
    /// pipelined round trip, persist the reserved ones in one transaction,
    /// advance the cached latest timestamp. Returns the records that
    /// survived and may be notified.
    ///
    /// On durable failure the whole batch is dropped and the reservations
    /// are NOT rolled back: those items will not be notified and will not
    /// be retried until their reservation keys expire.
    pub async fn filter_and_persist(&self, records: Vec<Announcement>) -> Vec<Announcement> {
        if records.is_empty() {
            return records;
        }
        let source = records[0].source.clone();
        let ids: Vec<String> = records.iter().map(|r| r.source_id.clone()).collect();

        let flags = match self.cache.reserve_many(&source, &ids).await {
            Ok(f) => f,
            Err(e) => {
                error!(source, error = %e, "fast-tier reserve failed, dropping batch");
                return Vec::new();
            }
        };

        let reserved: Vec<Announcement> = records
            .into_iter()
            .zip(flags)
            .filter_map(|(r, fresh)| fresh.then_some(r))
            .collect();
        if reserved.is_empty() {
            return reserved;
        }

        let persisted = match self.store.insert_many_if_new(&reserved).await {
            Ok(p) => p,
            Err(e) => {
                error!(source, error = %e, "durable insert failed, dropping batch");
                return Vec::new();
            }
        };

        if let Some(max_ms) = persisted.iter().map(|r| r.published_at_ms).max() {
            if let Err(e) = self.cache.set_latest_ms(&source, max_ms).await {
                warn!(source, error = %e, "failed to advance cached latest");
            }
        }

        if !persisted.is_empty() {
            info!(source, inserted = persisted.len(), "persisted new announcements");
        }
        persisted
    }

    /// Cached latest publish timestamp, falling back to the durable tier
    /// (and backfilling the cache) after fast-tier loss.
    pub async fn latest_ms(&self, source: &str) -> Result<Option<i64>> {
        match self.cache.latest_ms(source).await {
            Ok(Some(ms)) => return Ok(Some(ms)),
            Ok(None) => {}
            Err(e) => warn!(source, error = %e, "fast-tier latest lookup failed"),
        }

        let latest = self.store.latest_published_ms(source, 0).await?;
        if let Some(ms) = latest {
            if let Err(e) = self.cache.set_latest_ms(source, ms).await {
                warn!(source, error = %e, "failed to backfill cached latest");
            }
        }
        Ok(latest)
    }

    /// Durable point lookup for the pipeline's stop condition.
    pub async fn exists(&self, source: &str, id: &str) -> bool {
        self.store.exists(source, id).await
    }
}
