//! Time-series table sink
//!
//! Appends finalized candles to the `candles` hypertable with an
//! insert-or-ignore upsert, so replays and duplicate emissions collapse
//! into a single row.

use super::CandleSink;
use crate::candle::Candle;
use anyhow::Context;
use async_trait::async_trait;
use services_common::{retry, BackoffConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::debug;

const INSERT_CANDLE: &str = "INSERT INTO candles \
    (time, symbol, interval, open, high, low, close, volume) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
    ON CONFLICT (symbol, interval, time) DO NOTHING";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS candles (\
    time TIMESTAMPTZ NOT NULL, \
    symbol TEXT NOT NULL, \
    interval TEXT NOT NULL, \
    open DOUBLE PRECISION NOT NULL, \
    high DOUBLE PRECISION NOT NULL, \
    low DOUBLE PRECISION NOT NULL, \
    close DOUBLE PRECISION NOT NULL, \
    volume DOUBLE PRECISION NOT NULL)";

const CREATE_UNIQUE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
    candles_symbol_interval_time_idx ON candles (symbol, interval, time)";

/// PostgreSQL/TimescaleDB candle writer
pub struct TimescaleSink {
    pool: PgPool,
    backoff: BackoffConfig,
}

impl TimescaleSink {
    /// Connect to the database. Fails fast if it is unreachable.
    pub async fn connect(dsn: &str, backoff: BackoffConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect(dsn)
            .await
            .context("timescale connect")?;
        Ok(Self { pool, backoff })
    }

    /// Create the candles table and its unique key if they do not exist.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .context("create candles table")?;
        sqlx::query(CREATE_UNIQUE_INDEX)
            .execute(&self.pool)
            .await
            .context("create candles unique index")?;
        Ok(())
    }

    /// Cheap liveness probe used by the readiness endpoint.
    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("timescale ping")?;
        Ok(())
    }

    async fn insert(&self, candle: &Candle) -> Result<(), sqlx::Error> {
        sqlx::query(INSERT_CANDLE)
            .bind(candle.open_time)
            .bind(&candle.symbol)
            .bind(candle.interval.as_str())
            .bind(candle.open.as_f64())
            .bind(candle.high.as_f64())
            .bind(candle.low.as_f64())
            .bind(candle.close.as_f64())
            .bind(candle.volume.as_f64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CandleSink for TimescaleSink {
    fn name(&self) -> &'static str {
        "timescale"
    }

    async fn emit(&self, candle: &Candle) -> anyhow::Result<()> {
        retry(&self.backoff, "timescale-insert", || self.insert(candle))
            .await
            .context("timescale insert")?;
        debug!(
            symbol = %candle.symbol,
            interval = %candle.interval,
            start = %candle.open_time,
            "inserted candle"
        );
        Ok(())
    }
}
