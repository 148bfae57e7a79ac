//! Tests against real backends, skipped unless the env points at one.
//!
//! Run with:
//!   CANDLES_TEST_DATABASE_URL=postgres://... cargo test -- --ignored
//!   CANDLES_TEST_REDIS_URL=redis://...      cargo test -- --ignored

use crate::support::{test_metrics, ts};
use candle_aggregator::{
    Candle, CandleSink, Interval, PartialBarStore, RedisPartialBarStore, TimescaleSink,
};
use services_common::{BackoffConfig, Px, Qty};

fn sample_candle(symbol: &str) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        interval: Interval::M1,
        open_time: ts("2024-03-01T12:00:00Z"),
        close_time: ts("2024-03-01T12:01:00Z"),
        open: Px::new(10.0),
        high: Px::new(12.0),
        low: Px::new(10.0),
        close: Px::new(11.0),
        volume: Qty::new(6.0),
        complete: true,
    }
}

fn quick_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_interval_ms: 10,
        max_interval_ms: 50,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_ms: 500,
    }
}

/// S6: the same finalization applied twice leaves exactly one row.
#[tokio::test]
#[ignore = "requires a running PostgreSQL at CANDLES_TEST_DATABASE_URL"]
async fn duplicate_table_write_is_idempotent() {
    let dsn = std::env::var("CANDLES_TEST_DATABASE_URL").expect("CANDLES_TEST_DATABASE_URL");
    let sink = TimescaleSink::connect(&dsn, quick_backoff()).await.unwrap();
    sink.ensure_schema().await.unwrap();

    let candle = sample_candle("S6TESTSYM");
    sink.emit(&candle).await.unwrap();
    sink.emit(&candle).await.unwrap();

    let pool = sqlx::postgres::PgPoolOptions::new().connect(&dsn).await.unwrap();
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM candles WHERE symbol = $1 AND interval = '1m' AND time = $2",
    )
    .bind("S6TESTSYM")
    .bind(candle.open_time)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);

    sqlx::query("DELETE FROM candles WHERE symbol = $1")
        .bind("S6TESTSYM")
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a running Redis at CANDLES_TEST_REDIS_URL"]
async fn redis_store_round_trips_partial_bars() {
    let url = std::env::var("CANDLES_TEST_REDIS_URL").expect("CANDLES_TEST_REDIS_URL");
    let store = RedisPartialBarStore::connect(&url, 2, test_metrics())
        .await
        .unwrap();

    let mut candle = sample_candle("REDISTESTSYM");
    candle.complete = false;

    store.save(&candle).await.unwrap();
    let loaded = store
        .load_at("REDISTESTSYM", Interval::M1, ts("2024-03-01T12:00:30Z"))
        .await
        .unwrap()
        .expect("stored bar");
    assert_eq!(loaded, candle);

    store
        .delete_at("REDISTESTSYM", Interval::M1, ts("2024-03-01T12:00:30Z"))
        .await
        .unwrap();
    let gone = store
        .load_at("REDISTESTSYM", Interval::M1, ts("2024-03-01T12:00:30Z"))
        .await
        .unwrap();
    assert!(gone.is_none(), "absence is not an error");

    // Deleting a missing key is also fine.
    store
        .delete_at("REDISTESTSYM", Interval::M1, ts("2024-03-01T12:00:30Z"))
        .await
        .unwrap();
}
