//! Redis-backed partial-bar store

use super::{PartialBarStore, StoreError};
use crate::candle::Candle;
use crate::interval::Interval;
use crate::metrics::Metrics;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::debug;

/// Partial bars as JSON values under `ohlcv:<symbol>:<interval>:<start>`,
/// expiring after `ttl_multiplier` interval durations.
pub struct RedisPartialBarStore {
    conn: redis::aio::ConnectionManager,
    ttl_multiplier: u32,
    metrics: Arc<Metrics>,
}

impl RedisPartialBarStore {
    /// Connect and build the store. The connection manager reconnects on
    /// its own; individual command failures surface as `StoreError`.
    pub async fn connect(
        url: &str,
        ttl_multiplier: u32,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            ttl_multiplier,
            metrics,
        })
    }

    fn key(symbol: &str, interval: Interval, start: DateTime<Utc>) -> String {
        format!(
            "ohlcv:{symbol}:{interval}:{}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    fn ttl_secs(&self, interval: Interval) -> u64 {
        u64::from(self.ttl_multiplier) * interval.duration_secs() as u64
    }
}

#[async_trait]
impl PartialBarStore for RedisPartialBarStore {
    async fn save(&self, candle: &Candle) -> Result<(), StoreError> {
        let label = candle.interval.as_str();
        let key = Self::key(&candle.symbol, candle.interval, candle.open_time);

        let payload = serde_json::to_string(candle).map_err(|err| {
            self.metrics
                .redis_save_failed_total
                .with_label_values(&[label])
                .inc();
            StoreError::Corrupt(err.to_string())
        })?;

        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = conn
            .set_ex(&key, payload, self.ttl_secs(candle.interval))
            .await;

        result.map_err(|err| {
            self.metrics
                .redis_save_failed_total
                .with_label_values(&[label])
                .inc();
            StoreError::Unavailable(err.to_string())
        })
    }

    async fn load_at(
        &self,
        symbol: &str,
        interval: Interval,
        ts: DateTime<Utc>,
    ) -> Result<Option<Candle>, StoreError> {
        let label = interval.as_str();
        let key = Self::key(symbol, interval, interval.align(ts));

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<Candle>(&raw) {
            Ok(candle) => {
                self.metrics
                    .redis_restore_success_total
                    .with_label_values(&[label])
                    .inc();
                debug!(symbol, interval = label, "restored partial bar");
                Ok(Some(candle))
            }
            Err(err) => {
                self.metrics
                    .redis_restore_failed_total
                    .with_label_values(&[label])
                    .inc();
                Err(StoreError::Corrupt(err.to_string()))
            }
        }
    }

    async fn delete_at(
        &self,
        symbol: &str,
        interval: Interval,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = Self::key(symbol, interval, interval.align(ts));

        let mut conn = self.conn.clone();
        let _removed: i64 = conn
            .del(&key)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(())
    }
}
