//! Topic publisher sink
//!
//! Every finalized candle is published to `<prefix>.<interval>` keyed by
//! symbol, so per-symbol ordering is preserved by topic partitioning.
//! Delivery is at-least-once; consumers dedupe on `(symbol, open_time)`.

use super::CandleSink;
use crate::candle::Candle;
use crate::metrics::Metrics;
use anyhow::Context;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::{Deserialize, Serialize};
use services_common::{retry, BackoffConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wire record for the candle topics. Prices and volume are i64 ticks
/// (4 decimal places), timestamps are ms since epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Symbol
    pub symbol: String,
    /// Open price in ticks
    pub open: i64,
    /// High price in ticks
    pub high: i64,
    /// Low price in ticks
    pub low: i64,
    /// Close price in ticks
    pub close: i64,
    /// Volume in ticks
    pub volume: i64,
    /// Window start, ms since epoch
    pub open_time_ms: i64,
    /// Window end, ms since epoch
    pub close_time_ms: i64,
}

impl From<&Candle> for CandleRecord {
    fn from(c: &Candle) -> Self {
        Self {
            symbol: c.symbol.clone(),
            open: c.open.as_i64(),
            high: c.high.as_i64(),
            low: c.low.as_i64(),
            close: c.close.as_i64(),
            volume: c.volume.as_i64(),
            open_time_ms: c.open_time.timestamp_millis(),
            close_time_ms: c.close_time.timestamp_millis(),
        }
    }
}

/// Kafka publisher for finalized candles
pub struct KafkaCandleSink {
    producer: FutureProducer,
    topic_prefix: String,
    delivery_timeout: Duration,
    backoff: BackoffConfig,
    metrics: Arc<Metrics>,
}

impl KafkaCandleSink {
    /// Build the producer. `acks` is passed straight through to librdkafka.
    pub fn new(
        brokers: &str,
        acks: &str,
        delivery_timeout_ms: u64,
        topic_prefix: String,
        backoff: BackoffConfig,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", acks)
            .set("delivery.timeout.ms", delivery_timeout_ms.to_string())
            .create()
            .context("kafka producer")?;

        Ok(Self {
            producer,
            topic_prefix,
            delivery_timeout: Duration::from_millis(delivery_timeout_ms),
            backoff,
            metrics,
        })
    }

    fn topic_for(&self, candle: &Candle) -> String {
        format!("{}.{}", self.topic_prefix, candle.interval)
    }
}

#[async_trait]
impl CandleSink for KafkaCandleSink {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn emit(&self, candle: &Candle) -> anyhow::Result<()> {
        let label = candle.interval.as_str();
        let topic = self.topic_for(candle);
        let payload =
            bincode::serialize(&CandleRecord::from(candle)).context("encode candle record")?;

        let result = retry(&self.backoff, "kafka-publish", || async {
            let record = FutureRecord::to(&topic)
                .key(candle.symbol.as_str())
                .payload(&payload);
            self.producer
                .send(record, Timeout::After(self.delivery_timeout))
                .await
                .map_err(|(err, _msg)| err)
        })
        .await;

        match result {
            Ok((partition, offset)) => {
                self.metrics
                    .kafka_published_total
                    .with_label_values(&[label])
                    .inc();
                debug!(
                    symbol = %candle.symbol,
                    interval = label,
                    topic,
                    partition,
                    offset,
                    "published candle"
                );
                Ok(())
            }
            Err(err) => {
                self.metrics
                    .kafka_publish_failed_total
                    .with_label_values(&[label])
                    .inc();
                Err(anyhow::Error::new(err).context(format!("publish to {topic}")))
            }
        }
    }
}
