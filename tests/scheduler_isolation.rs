// A failing source must not disturb healthy siblings, and shutdown must
// stop every loop.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use listing_sentinel::notify::Router;
use listing_sentinel::scheduler::{spawn_source_loop, spawn_stats_loop, Stats};

use common::{dedup_for, pipeline_for, CountingNotifier, FakeAdapter};

#[tokio::test]
async fn failing_source_does_not_block_healthy_one() {
    let dedup = dedup_for(&["binance", "okx"]);
    let router = Arc::new(Router::new(vec![], 0));
    let notifier = Arc::new(CountingNotifier::default());
    let stats = Arc::new(Stats::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let good = pipeline_for(FakeAdapter::new("binance", &[("a", 100)]), dedup.clone());
    let bad = pipeline_for(FakeAdapter::failing("okx"), dedup.clone());

    let handles = vec![
        spawn_source_loop(
            good,
            dedup.clone(),
            router.clone(),
            notifier.clone(),
            Duration::from_millis(20),
            stats.clone(),
            shutdown_rx.clone(),
        ),
        spawn_source_loop(
            bad,
            dedup.clone(),
            router.clone(),
            notifier.clone(),
            Duration::from_millis(20),
            stats.clone(),
            shutdown_rx.clone(),
        ),
        // Long report interval so the reporter never resets counters
        // before the assertions below.
        spawn_stats_loop(stats.clone(), Duration::from_secs(30), shutdown_rx),
    ];

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    let snap = stats.snapshot().await;
    let good_counters = &snap["binance"];
    let bad_counters = &snap["okx"];

    // Both loops kept cycling independently.
    assert!(good_counters.cycles >= 2, "{good_counters:?}");
    assert!(bad_counters.errors >= 2, "{bad_counters:?}");
    assert_eq!(good_counters.errors, 0);

    // The healthy source's single record was delivered exactly once.
    assert_eq!(good_counters.new_records, 1);
    assert_eq!(notifier.delivered.load(Ordering::SeqCst), 1);
}
