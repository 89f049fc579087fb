// src/dedup/cache.rs
// Fast-tier reservation cache: atomic set-if-absent keys with a bounded
// TTL. A deduplication fence, not an archive.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

/// Reservation keys expire after 7 days.
pub const RESERVATION_TTL: Duration = Duration::from_secs(7 * 86_400);
/// Cached "latest seen" values expire after 30 days.
pub const LATEST_TTL: Duration = Duration::from_secs(30 * 86_400);

fn reservation_key(source: &str, id: &str) -> String {
    format!("ann:{source}:{id}")
}

fn latest_key(source: &str) -> String {
    format!("latest:{source}")
}

/// Atomic reservation primitives shared by all source tasks. The
/// set-if-absent semantics of `reserve` are the only cross-task mutual
/// exclusion the pipeline needs.
#[async_trait]
pub trait ReservationCache: Send + Sync {
    /// Atomically create the key if absent. `true` only when this call
    /// created it.
    async fn reserve(&self, source: &str, id: &str) -> Result<bool>;

    /// Batch variant, one pipelined round trip. Flag order matches `ids`.
    async fn reserve_many(&self, source: &str, ids: &[String]) -> Result<Vec<bool>>;

    async fn latest_ms(&self, source: &str) -> Result<Option<i64>>;

    /// Monotonic: only moves the stored value forward.
    async fn set_latest_ms(&self, source: &str, ms: i64) -> Result<()>;
}

/// Redis-backed fast tier: `SET key 1 NX EX <ttl>`.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .context("connecting to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ReservationCache for RedisCache {
    async fn reserve(&self, source: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(reservation_key(source, id))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(RESERVATION_TTL.as_secs())
            .query_async(&mut conn)
            .await
            .context("redis reserve")?;
        Ok(set.is_some())
    }

    async fn reserve_many(&self, source: &str, ids: &[String]) -> Result<Vec<bool>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for id in ids {
            pipe.cmd("SET")
                .arg(reservation_key(source, id))
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(RESERVATION_TTL.as_secs());
        }
        let flags: Vec<Option<String>> = pipe
            .query_async(&mut conn)
            .await
            .context("redis reserve pipeline")?;
        Ok(flags.into_iter().map(|f| f.is_some()).collect())
    }

    async fn latest_ms(&self, source: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(latest_key(source))
            .query_async(&mut conn)
            .await
            .context("redis get latest")?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn set_latest_ms(&self, source: &str, ms: i64) -> Result<()> {
        // Single writer per source, so get-then-set is race-free enough.
        let current = self.latest_ms(source).await?;
        if current.is_some_and(|c| ms <= c) {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(latest_key(source))
            .arg(ms.to_string())
            .arg("EX")
            .arg(LATEST_TTL.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .context("redis set latest")?;
        Ok(())
    }
}

/// In-process fast tier with the same semantics, used in tests and in
/// redis-less deployments.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set_nx(&self, key: String, value: String, ttl: Duration) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(&key) {
            Some((_, expires)) if *expires > now => false,
            _ => {
                entries.insert(key, (value, now + ttl));
                true
            }
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(v, _)| v.clone())
    }

    #[cfg(test)]
    async fn reserve_with_ttl(&self, source: &str, id: &str, ttl: Duration) -> bool {
        self.set_nx(reservation_key(source, id), "1".into(), ttl)
            .await
    }
}

#[async_trait]
impl ReservationCache for MemoryCache {
    async fn reserve(&self, source: &str, id: &str) -> Result<bool> {
        Ok(self
            .set_nx(reservation_key(source, id), "1".into(), RESERVATION_TTL)
            .await)
    }

    async fn reserve_many(&self, source: &str, ids: &[String]) -> Result<Vec<bool>> {
        let mut flags = Vec::with_capacity(ids.len());
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        for id in ids {
            let key = reservation_key(source, id);
            let fresh = match entries.get(&key) {
                Some((_, expires)) if *expires > now => false,
                _ => {
                    entries.insert(key, ("1".into(), now + RESERVATION_TTL));
                    true
                }
            };
            flags.push(fresh);
        }
        Ok(flags)
    }

    async fn latest_ms(&self, source: &str) -> Result<Option<i64>> {
        Ok(self
            .get(&latest_key(source))
            .await
            .and_then(|v| v.parse().ok()))
    }

    async fn set_latest_ms(&self, source: &str, ms: i64) -> Result<()> {
        let current = self.latest_ms(source).await?;
        if current.is_some_and(|c| ms <= c) {
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        entries.insert(
            latest_key(source),
            (ms.to_string(), Instant::now() + LATEST_TTL),
        );
        Ok(())
    }
}
