//! Prometheus instrumentation for the aggregation pipeline
//!
//! All collectors are registered against an explicit registry owned by the
//! process; nothing global. The namespace comes from the service identity so
//! metric cardinality is fixed at construction.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use services_common::ServiceIdentity;

const INTERVAL_LABEL: &[&str] = &["interval"];

/// Counters, histograms and gauges exposed by the core.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Ticks accepted, per interval
    pub processed_total: IntCounterVec,
    /// Finalized candles, per interval
    pub flushed_total: IntCounterVec,
    /// Seconds between last tick and finalization, per interval
    pub flush_latency: HistogramVec,
    /// Partial-bar restore failures, per interval
    pub restore_errors_total: IntCounterVec,
    /// Unix seconds of the last finalization, per interval
    pub last_flush_timestamp: prometheus::GaugeVec,
    /// Undecodable messages on the raw topic
    pub invalid_messages_total: IntCounter,
    /// Candles published downstream, per interval
    pub kafka_published_total: IntCounterVec,
    /// Failed downstream publishes, per interval
    pub kafka_publish_failed_total: IntCounterVec,
    /// Partial-bar save failures, per interval
    pub redis_save_failed_total: IntCounterVec,
    /// Partial-bar restores that produced a bar, per interval
    pub redis_restore_success_total: IntCounterVec,
    /// Partial-bar restores that failed to decode or load, per interval
    pub redis_restore_failed_total: IntCounterVec,
}

impl Metrics {
    /// Build and register every collector.
    pub fn new(identity: &ServiceIdentity, registry: &Registry) -> prometheus::Result<Self> {
        let ns = identity.metrics_namespace();

        let counter_vec = |subsystem: &str, name: &str, help: &str| {
            IntCounterVec::new(
                Opts::new(name, help).namespace(ns.clone()).subsystem(subsystem),
                INTERVAL_LABEL,
            )
        };

        let metrics = Self {
            processed_total: counter_vec(
                "aggregator",
                "processed_total",
                "Total trade ticks accepted",
            )?,
            flushed_total: counter_vec(
                "aggregator",
                "flushed_total",
                "Total finalized candles flushed",
            )?,
            flush_latency: HistogramVec::new(
                HistogramOpts::new("flush_latency_seconds", "Time between last tick and flush")
                    .namespace(ns.clone())
                    .subsystem("aggregator"),
                INTERVAL_LABEL,
            )?,
            restore_errors_total: counter_vec(
                "aggregator",
                "restore_errors_total",
                "Failed partial-bar restore attempts",
            )?,
            last_flush_timestamp: prometheus::GaugeVec::new(
                Opts::new(
                    "last_flush_timestamp_seconds",
                    "Wall clock of the last successful flush (unix seconds)",
                )
                .namespace(ns.clone())
                .subsystem("aggregator"),
                INTERVAL_LABEL,
            )?,
            invalid_messages_total: IntCounter::with_opts(
                Opts::new("invalid_messages_total", "Undecodable raw topic messages")
                    .namespace(ns.clone())
                    .subsystem("kafka"),
            )?,
            kafka_published_total: counter_vec(
                "kafka",
                "published_total",
                "Candles published to the output topics",
            )?,
            kafka_publish_failed_total: counter_vec(
                "kafka",
                "publish_failed_total",
                "Failed candle publish attempts",
            )?,
            redis_save_failed_total: counter_vec(
                "redis",
                "save_failed_total",
                "Partial-bar save failures",
            )?,
            redis_restore_success_total: counter_vec(
                "redis",
                "restore_success_total",
                "Partial-bar restore successes",
            )?,
            redis_restore_failed_total: counter_vec(
                "redis",
                "restore_failed_total",
                "Partial-bar restore failures",
            )?,
        };

        registry.register(Box::new(metrics.processed_total.clone()))?;
        registry.register(Box::new(metrics.flushed_total.clone()))?;
        registry.register(Box::new(metrics.flush_latency.clone()))?;
        registry.register(Box::new(metrics.restore_errors_total.clone()))?;
        registry.register(Box::new(metrics.last_flush_timestamp.clone()))?;
        registry.register(Box::new(metrics.invalid_messages_total.clone()))?;
        registry.register(Box::new(metrics.kafka_published_total.clone()))?;
        registry.register(Box::new(metrics.kafka_publish_failed_total.clone()))?;
        registry.register(Box::new(metrics.redis_save_failed_total.clone()))?;
        registry.register(Box::new(metrics.redis_restore_success_total.clone()))?;
        registry.register(Box::new(metrics.redis_restore_failed_total.clone()))?;

        Ok(metrics)
    }
}
