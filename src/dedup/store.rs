// src/dedup/store.rs
// Durable tier: one sqlite table per source, idempotent inserts. This is
// the authoritative record of what has ever been delivered.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::model::Announcement;

/// Sqlite wrapper shared across source tasks; calls hop to the blocking
/// pool. Tables are partitioned per source, so writers for different
/// sources never contend on the same rows.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    sources: Vec<String>,
}

impl SqliteStore {
    pub fn open(path: &Path, sources: &[String]) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite db {}", path.display()))?;
        Self::with_connection(conn, sources)
    }

    pub fn open_in_memory(sources: &[String]) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, sources)
    }

    fn with_connection(conn: Connection, sources: &[String]) -> Result<Self> {
        let sources: Vec<String> = sources.iter().map(|s| s.to_lowercase()).collect();
        for s in &sources {
            validate_table_name(s)?;
        }
        init_schema(&conn, &sources)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sources,
        })
    }

    fn table(&self, source: &str) -> Result<String> {
        let s = source.to_lowercase();
        if !self.sources.contains(&s) {
            bail!("unsupported source: {source}");
        }
        Ok(s)
    }

    /// Insert a batch inside one transaction with `INSERT OR IGNORE` on the
    /// unique `source_id`. Returns the records actually written.
    pub async fn insert_many_if_new(
        &self,
        records: &[Announcement],
    ) -> Result<Vec<Announcement>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table(&records[0].source)?;
        let conn = self.conn.clone();
        let records = records.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap();
            let tx = guard.transaction()?;
            let mut inserted = Vec::new();
            {
                let sql = format!(
                    "INSERT OR IGNORE INTO {table} (
                        source_id, tickers, title, url, published_at_ms,
                        body_text, classified_type, categories, created_at_ms
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                );
                let mut stmt = tx.prepare(&sql)?;
                let now_ms = chrono::Utc::now().timestamp_millis();
                for ann in &records {
                    let changes = stmt.execute(params![
                        ann.source_id,
                        serde_json::to_string(&ann.tickers)?,
                        ann.title,
                        ann.url,
                        ann.published_at_ms,
                        ann.body_text,
                        ann.kind.as_str(),
                        serde_json::to_string(&ann.category)?,
                        now_ms,
                    ])?;
                    if changes > 0 {
                        inserted.push(ann.clone());
                    }
                }
            }
            tx.commit()?;
            Ok::<_, anyhow::Error>(inserted)
        })
        .await?
    }

    /// Nth-from-latest publish timestamp for a source (step 0 = latest).
    /// The offset form exists to re-derive a cutoff after partial failures.
    pub async fn latest_published_ms(&self, source: &str, step: u32) -> Result<Option<i64>> {
        let table = self.table(source)?;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap();
            let sql = format!(
                "SELECT published_at_ms FROM {table}
                 ORDER BY published_at_ms DESC LIMIT 1 OFFSET ?1"
            );
            let latest = guard
                .query_row(&sql, params![step], |row| row.get::<_, i64>(0))
                .optional()?;
            Ok::<_, anyhow::Error>(latest)
        })
        .await?
    }

    /// Point lookup used by the pipeline's stop condition. Degrades to
    /// `false` on any storage error, it must never abort a batch.
    pub async fn exists(&self, source: &str, id: &str) -> bool {
        let Ok(table) = self.table(source) else {
            return false;
        };
        let conn = self.conn.clone();
        let id = id.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap();
            let sql = format!("SELECT 1 FROM {table} WHERE source_id = ?1");
            guard
                .query_row(&sql, params![id], |_| Ok(()))
                .optional()
                .map(|row| row.is_some())
        })
        .await;

        match result {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(source, error = %e, "exists lookup failed");
                false
            }
            Err(e) => {
                warn!(source, error = %e, "exists task failed");
                false
            }
        }
    }
}

fn validate_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        bail!("invalid source table name: {name:?}");
    }
    Ok(())
}

fn init_schema(conn: &Connection, sources: &[String]) -> Result<()> {
    let mut schema = String::from("PRAGMA journal_mode=WAL;\n");
    for source in sources {
        schema.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {source} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL UNIQUE,
                tickers TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                published_at_ms INTEGER NOT NULL,
                body_text TEXT,
                classified_type TEXT NOT NULL,
                categories TEXT,
                created_at_ms INTEGER NOT NULL
            );\n"
        ));
    }
    conn.execute_batch(&schema).context("creating schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnouncementKind, CategoryMapping};

    fn ann(source: &str, id: &str, ms: i64) -> Announcement {
        Announcement {
            source: source.into(),
            source_id: id.into(),
            tickers: vec!["ARB".into()],
            title: format!("listing {id}"),
            url: format!("https://example.com/{id}"),
            published_at_ms: ms,
            body_text: Some("body".into()),
            kind: AnnouncementKind::ListingSpot,
            category: CategoryMapping::other(),
        }
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(&["binance".to_string(), "bybit".to_string()]).unwrap()
    }

    #[tokio::test]
    async fn duplicate_ids_are_ignored_on_insert() {
        let s = store();
        let batch = vec![ann("binance", "a", 100), ann("binance", "b", 200)];
        let first = s.insert_many_if_new(&batch).await.unwrap();
        assert_eq!(first.len(), 2);

        let again = vec![ann("binance", "b", 200), ann("binance", "c", 300)];
        let second = s.insert_many_if_new(&again).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].source_id, "c");
    }

    #[tokio::test]
    async fn latest_published_supports_offset() {
        let s = store();
        let batch = vec![
            ann("binance", "a", 100),
            ann("binance", "b", 300),
            ann("binance", "c", 200),
        ];
        s.insert_many_if_new(&batch).await.unwrap();

        assert_eq!(s.latest_published_ms("binance", 0).await.unwrap(), Some(300));
        assert_eq!(s.latest_published_ms("binance", 1).await.unwrap(), Some(200));
        assert_eq!(s.latest_published_ms("binance", 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn exists_degrades_to_false_for_unknown_source() {
        let s = store();
        assert!(!s.exists("kraken", "a").await);
        assert!(!s.exists("binance", "missing").await);
        s.insert_many_if_new(&[ann("binance", "a", 1)]).await.unwrap();
        assert!(s.exists("binance", "a").await);
    }

    #[tokio::test]
    async fn unknown_source_insert_is_an_error() {
        let s = store();
        let err = s.insert_many_if_new(&[ann("kraken", "a", 1)]).await;
        assert!(err.is_err());
    }

    #[test]
    fn table_names_are_validated() {
        assert!(validate_table_name("binance").is_ok());
        assert!(validate_table_name("a_b2").is_ok());
        assert!(validate_table_name("Binance").is_err());
        assert!(validate_table_name("x; DROP TABLE y").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[tokio::test]
    async fn sources_are_isolated_per_table() {
        let s = store();
        s.insert_many_if_new(&[ann("binance", "shared", 1)])
            .await
            .unwrap();
        assert!(!s.exists("bybit", "shared").await);
        let inserted = s
            .insert_many_if_new(&[ann("bybit", "shared", 2)])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 1);
    }
}
