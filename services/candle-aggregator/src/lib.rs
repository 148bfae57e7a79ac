//! Candle Aggregation Service
//!
//! Consumes the raw trade topic and turns the tape into fixed-interval
//! OHLCV candles at every configured interval simultaneously:
//! - one in-flight bar per `(symbol, interval)` slot, closed by tick
//!   roll-over or by the wall-clock sweep
//! - in-flight bars written through to Redis so a restart resumes mid-window
//! - finalized bars fanned out to the time-series table and the candle
//!   topics, at-least-once with idempotent table upserts

pub mod candle;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod interval;
pub mod manager;
pub mod metrics;
pub mod server;
pub mod sinks;
pub mod storage;

pub use candle::{Candle, CandleState};
pub use clock::{Clock, SystemClock};
pub use config::AggregatorConfig;
pub use ingest::{decode_trade, TradeConsumer, TradeEvent};
pub use interval::Interval;
pub use manager::AggregationManager;
pub use metrics::Metrics;
pub use sinks::{CandleSink, KafkaCandleSink, MultiSink, TimescaleSink};
pub use storage::{PartialBarStore, RedisPartialBarStore, StoreError};
