//! Trade stream ingest
//!
//! Group consumer over the raw trade topic. Each decoded trade is handed to
//! the manager before its offset is committed; on processing failure the
//! offset stays uncommitted and the broker redelivers after a rebalance or
//! restart. Malformed messages would block the partition forever, so they
//! are counted, skipped and committed.

use crate::manager::AggregationManager;
use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use serde::Deserialize;
use services_common::{BackoffConfig, Px, Qty};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// One decoded trade from the raw topic
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    /// Symbol, non-empty
    pub symbol: String,
    /// Trade price, strictly positive
    pub price: Px,
    /// Trade volume, non-negative
    pub volume: Qty,
    /// Exchange event time
    pub timestamp: DateTime<Utc>,
}

/// Raw wire shape, terse exchange-style keys: decimals ride as strings,
/// the event time (`E`, publication time) as ms since epoch. Fields the
/// aggregation does not use are ignored.
#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    volume: String,
    #[serde(rename = "E")]
    event_time: i64,
}

/// Why a raw message was dropped
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not valid JSON for the trade shape
    #[error("malformed trade message: {0}")]
    Json(#[from] serde_json::Error),
    /// Symbol field empty
    #[error("empty symbol")]
    EmptySymbol,
    /// Price or volume not a finite decimal
    #[error("unparseable decimal {field}: {value:?}")]
    BadDecimal {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },
    /// Price must be strictly positive
    #[error("non-positive price {0}")]
    NonPositivePrice(f64),
    /// Volume must be non-negative
    #[error("negative volume {0}")]
    NegativeVolume(f64),
    /// Event time missing or before the epoch
    #[error("non-positive event time {0}")]
    BadTimestamp(i64),
}

/// Decode and validate one raw message payload.
pub fn decode_trade(payload: &[u8]) -> Result<TradeEvent, DecodeError> {
    let raw: RawTrade = serde_json::from_slice(payload)?;

    if raw.symbol.is_empty() {
        return Err(DecodeError::EmptySymbol);
    }

    let price: f64 = raw
        .price
        .parse()
        .map_err(|_| DecodeError::BadDecimal {
            field: "price",
            value: raw.price.clone(),
        })?;
    if !price.is_finite() || price <= 0.0 {
        return Err(DecodeError::NonPositivePrice(price));
    }

    let volume: f64 = raw
        .volume
        .parse()
        .map_err(|_| DecodeError::BadDecimal {
            field: "volume",
            value: raw.volume.clone(),
        })?;
    if !volume.is_finite() || volume < 0.0 {
        return Err(DecodeError::NegativeVolume(volume));
    }

    if raw.event_time <= 0 {
        return Err(DecodeError::BadTimestamp(raw.event_time));
    }
    let timestamp = DateTime::from_timestamp_millis(raw.event_time)
        .ok_or(DecodeError::BadTimestamp(raw.event_time))?;

    Ok(TradeEvent {
        symbol: raw.symbol,
        price: Px::new(price),
        volume: Qty::new(volume),
        timestamp,
    })
}

/// Group consumer feeding the aggregation manager
pub struct TradeConsumer {
    consumer: StreamConsumer,
    manager: Arc<AggregationManager>,
    metrics: Arc<Metrics>,
    backoff: BackoffConfig,
    shutdown: watch::Receiver<bool>,
}

impl TradeConsumer {
    /// Subscribe to the raw topic with manual offset commits.
    pub fn new(
        brokers: &str,
        group_id: &str,
        raw_topic: &str,
        manager: Arc<AggregationManager>,
        metrics: Arc<Metrics>,
        backoff: BackoffConfig,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[raw_topic])?;

        Ok(Self {
            consumer,
            manager,
            metrics,
            backoff,
            shutdown,
        })
    }

    /// Consume until shutdown. Broker errors back the loop off without
    /// losing group membership; librdkafka re-establishes the session.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut delay = Duration::from_millis(self.backoff.initial_interval_ms);

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("trade consumer stopping");
                        break;
                    }
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        delay = Duration::from_millis(self.backoff.initial_interval_ms);
                        self.handle_message(&message).await;
                    }
                    Err(err) => {
                        error!(error = %err, delay_ms = delay.as_millis() as u64, "consume failed");
                        tokio::time::sleep(self.backoff.jitter(delay)).await;
                        delay = self.backoff.next_delay(delay);
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_message(&self, message: &BorrowedMessage<'_>) {
        let Some(payload) = message.payload() else {
            self.metrics.invalid_messages_total.inc();
            self.commit(message);
            return;
        };

        match decode_trade(payload) {
            Err(err) => {
                debug!(error = %err, offset = message.offset(), "dropping malformed trade");
                self.metrics.invalid_messages_total.inc();
                self.commit(message);
            }
            Ok(trade) => match self.manager.process(&trade).await {
                Ok(()) => self.commit(message),
                Err(err) => {
                    // No commit: the broker redelivers this offset later.
                    error!(
                        symbol = %trade.symbol,
                        offset = message.offset(),
                        error = ?err,
                        "trade processing failed"
                    );
                }
            },
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(err) = self.consumer.commit_message(message, CommitMode::Async) {
            warn!(offset = message.offset(), error = %err, "offset commit failed");
        }
    }
}
