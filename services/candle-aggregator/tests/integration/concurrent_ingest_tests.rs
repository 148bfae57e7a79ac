//! Concurrent callers contend on the manager without losing ticks

use crate::support::{harness, trade, ts};
use candle_aggregator::Interval;
use services_common::{Px, Qty};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_process_calls_lose_nothing() {
    let h = harness(&[Interval::M1], "2024-03-01T12:00:00Z");
    h.clock.set("2024-03-01T12:00:30Z");

    let tasks: Vec<_> = (0..8)
        .map(|worker| {
            let manager = h.manager.clone();
            tokio::spawn(async move {
                let price = 100.0 + f64::from(worker);
                for _ in 0..100 {
                    let event = trade("BTCUSDT", "2024-03-01T12:00:30Z", price, 1.0);
                    manager.process(&event).await.unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    h.sweep_at("2024-03-01T12:01:00.100Z").await;

    let emitted = h.sink.emitted_for("BTCUSDT", Interval::M1);
    assert_eq!(emitted.len(), 1);
    let c = &emitted[0];
    assert_eq!(c.open_time, ts("2024-03-01T12:00:00Z"));
    assert_eq!(c.volume, Qty::new(800.0), "every tick counted exactly once");
    assert_eq!(c.high, Px::new(107.0));
    assert_eq!(c.low, Px::new(100.0));
    assert_eq!(
        h.metrics.processed_total.with_label_values(&["1m"]).get(),
        800
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_and_ingest_contend_safely() {
    let h = harness(&[Interval::M1], "2024-03-01T12:00:00Z");

    let sweeper = {
        let manager = h.manager.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                manager.flush_expired().await;
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..200 {
        let event = trade("ETHUSDT", "2024-03-01T12:00:10Z", 2000.0 + (i % 7) as f64, 0.5);
        h.manager.process(&event).await.unwrap();
    }
    sweeper.await.unwrap();

    // Clock never crossed the window end, so nothing finalized early.
    assert!(h.sink.emitted().is_empty());

    h.sweep_at("2024-03-01T12:01:00.100Z").await;
    let emitted = h.sink.emitted_for("ETHUSDT", Interval::M1);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].volume, Qty::new(100.0));
}
