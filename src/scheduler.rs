// src/scheduler.rs
// One tokio task per source, plus a periodic stats reporter. A source
// failure is logged and counted; it never touches its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use rand::Rng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dedup::DedupStore;
use crate::notify::{format_message, Notifier, Router};
use crate::pipeline::IngestionPipeline;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Completed poll cycles per source");
        describe_counter!("poll_errors_total", "Failed poll cycles per source");
        describe_counter!(
            "announcements_new_total",
            "Announcements that survived deduplication"
        );
        describe_counter!("items_seen_total", "Raw feed items inspected");
        describe_counter!("notify_failures_total", "Notifications dropped after retries");
    });
}

#[derive(Debug, Default, Clone)]
pub struct SourceCounters {
    pub cycles: u64,
    pub errors: u64,
    pub new_records: u64,
    pub items_seen: u64,
}

/// Per-source counters accumulated between stats reports.
#[derive(Default)]
pub struct Stats {
    counters: Mutex<HashMap<String, SourceCounters>>,
}

impl Stats {
    pub async fn record_success(&self, source: &str, new_records: usize, items_seen: usize) {
        let mut counters = self.counters.lock().await;
        let entry = counters.entry(source.to_string()).or_default();
        entry.cycles += 1;
        entry.new_records += new_records as u64;
        entry.items_seen += items_seen as u64;
    }

    pub async fn record_error(&self, source: &str) {
        let mut counters = self.counters.lock().await;
        let entry = counters.entry(source.to_string()).or_default();
        entry.cycles += 1;
        entry.errors += 1;
    }

    pub async fn snapshot(&self) -> HashMap<String, SourceCounters> {
        self.counters.lock().await.clone()
    }

    pub async fn snapshot_and_reset(&self) -> HashMap<String, SourceCounters> {
        std::mem::take(&mut *self.counters.lock().await)
    }
}

/// Sleep interval with ±10% jitter so sources drift apart instead of
/// polling in lockstep.
fn jittered(interval: Duration) -> Duration {
    interval.mul_f64(rand::rng().random_range(0.9..=1.1))
}

pub fn spawn_source_loop(
    pipeline: IngestionPipeline,
    dedup: Arc<DedupStore>,
    router: Arc<Router>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    ensure_metrics_described();
    tokio::spawn(async move {
        let source = pipeline.source().to_string();
        info!(source, interval_secs = interval.as_secs(), "source loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match pipeline.fetch_latest().await {
                Ok((records, total)) => {
                    let fresh = dedup.filter_and_persist(records).await;
                    for ann in &fresh {
                        let thread_id = router.destination(ann);
                        let text = format_message(ann);
                        if !notifier.deliver(thread_id, &text).await {
                            counter!("notify_failures_total", "source" => source.clone())
                                .increment(1);
                            warn!(
                                source,
                                source_id = %ann.source_id,
                                "notification delivery failed"
                            );
                        }
                    }
                    counter!("poll_cycles_total", "source" => source.clone()).increment(1);
                    counter!("announcements_new_total", "source" => source.clone())
                        .increment(fresh.len() as u64);
                    counter!("items_seen_total", "source" => source.clone())
                        .increment(total as u64);
                    stats.record_success(&source, fresh.len(), total).await;
                }
                Err(e) => {
                    counter!("poll_errors_total", "source" => source.clone()).increment(1);
                    stats.record_error(&source).await;
                    warn!(source, error = %e, "poll cycle failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(jittered(interval)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(source, "source loop stopped");
    })
}

/// Periodic one-line health summary across all sources, counters reset
/// after each report.
pub fn spawn_stats_loop(
    stats: Arc<Stats>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }

            let snapshot = stats.snapshot_and_reset().await;
            if snapshot.is_empty() {
                continue;
            }
            let mut parts: Vec<String> = snapshot
                .iter()
                .map(|(name, c)| {
                    let icon = if c.errors > 0 {
                        "❌"
                    } else if c.new_records > 0 {
                        "✅"
                    } else {
                        "✓"
                    };
                    format!("{icon} {name} {}/{} ({} err)", c.new_records, c.items_seen, c.errors)
                })
                .collect();
            parts.sort();
            info!("{}", parts.join(" | "));
        }
    })
}
