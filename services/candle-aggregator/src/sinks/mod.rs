//! Terminal sinks for finalized candles
//!
//! A finalized candle is handed to every configured sink exactly once. The
//! fan-out preserves the first error but still attempts the remaining
//! sinks, so one broken destination cannot starve durable storage.

pub mod kafka;
pub mod timescale;

use crate::candle::Candle;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub use kafka::{CandleRecord, KafkaCandleSink};
pub use timescale::TimescaleSink;

/// Terminal consumer of finalized candles.
#[async_trait]
pub trait CandleSink: Send + Sync {
    /// Sink name for logs and error context
    fn name(&self) -> &'static str;

    /// Deliver one finalized candle. At-least-once: callers may retry a
    /// whole emission, so implementations must be idempotent per
    /// `(symbol, interval, open_time)`.
    async fn emit(&self, candle: &Candle) -> anyhow::Result<()>;
}

/// Fan-out over a fixed list of sinks provided at startup.
pub struct MultiSink {
    sinks: Vec<Arc<dyn CandleSink>>,
}

impl MultiSink {
    /// Compose the given sinks. Order is the emission order.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn CandleSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl CandleSink for MultiSink {
    fn name(&self) -> &'static str {
        "multi"
    }

    async fn emit(&self, candle: &Candle) -> anyhow::Result<()> {
        let mut first_err: Option<anyhow::Error> = None;

        for sink in &self.sinks {
            if let Err(err) = sink.emit(candle).await {
                warn!(
                    sink = sink.name(),
                    symbol = %candle.symbol,
                    interval = %candle.interval,
                    error = ?err,
                    "sink emit failed"
                );
                if first_err.is_none() {
                    first_err = Some(err.context(format!("sink {}", sink.name())));
                }
            }
        }

        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
