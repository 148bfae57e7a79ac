//! Candle Aggregator Service
//!
//! Wires the ingest consumer, aggregation manager, partial-bar store,
//! terminal sinks and the observability server, then runs until SIGINT.

use anyhow::{Context, Result};
use candle_aggregator::{
    server, AggregationManager, AggregatorConfig, KafkaCandleSink, Metrics, MultiSink,
    RedisPartialBarStore, SystemClock, TimescaleSink, TradeConsumer,
};
use clap::Parser;
use prometheus::Registry;
use services_common::ServiceIdentity;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "candle-aggregator", about = "Multi-interval OHLCV candle aggregator")]
struct Args {
    /// Path to a JSON config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let cfg = match &args.config {
        Some(path) => AggregatorConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AggregatorConfig::default(),
    };
    cfg.validate().context("invalid configuration")?;
    let intervals = cfg.parsed_intervals()?;

    info!(
        service = %cfg.service_name,
        version = %cfg.service_version,
        ?intervals,
        "starting candle aggregator"
    );

    let identity = ServiceIdentity::new(cfg.service_name.clone(), cfg.service_version.clone());
    let registry = Registry::new();
    let metrics = Arc::new(Metrics::new(&identity, &registry).context("metrics registration")?);

    // Partial-bar store; in-flight bars survive restarts here.
    let store = Arc::new(
        RedisPartialBarStore::connect(
            &cfg.redis.url,
            cfg.partial_store_ttl_multiplier,
            metrics.clone(),
        )
        .await
        .context("redis init")?,
    );

    // Terminal sinks. The table must be reachable before we consume.
    let table = Arc::new(
        TimescaleSink::connect(&cfg.timescale.dsn, cfg.backoff.clone())
            .await
            .context("timescale init")?,
    );
    table.ensure_schema().await.context("timescale schema")?;

    let publisher = Arc::new(
        KafkaCandleSink::new(
            &cfg.kafka.brokers,
            &cfg.kafka.acks,
            cfg.kafka.delivery_timeout_ms,
            cfg.output_topic_prefix.clone(),
            cfg.backoff.clone(),
            metrics.clone(),
        )
        .context("kafka producer init")?,
    );

    let table_sink: Arc<dyn candle_aggregator::CandleSink> = table.clone();
    let publisher_sink: Arc<dyn candle_aggregator::CandleSink> = publisher;
    let sink = Arc::new(MultiSink::new(vec![table_sink, publisher_sink]));

    let manager = Arc::new(AggregationManager::new(
        intervals,
        sink,
        store,
        Arc::new(SystemClock),
        metrics.clone(),
        cfg.flush_interval(),
        cfg.drain_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let flush_task = manager.clone().spawn_flush_loop(shutdown_rx.clone());

    let consumer = TradeConsumer::new(
        &cfg.kafka.brokers,
        &cfg.kafka.group_id,
        &cfg.kafka.raw_topic,
        manager.clone(),
        metrics.clone(),
        cfg.backoff.clone(),
        shutdown_rx.clone(),
    )
    .context("kafka consumer init")?;
    let consumer_task = tokio::spawn(consumer.run());

    let readiness: Arc<dyn server::Readiness> = table.clone();
    let server_task = tokio::spawn(server::serve(
        cfg.http.port,
        registry.clone(),
        readiness,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Stop intake first, then close out what is left in memory.
    if let Err(err) = consumer_task.await.context("consumer task join")? {
        error!(error = ?err, "consumer exited with error");
    }
    if let Err(err) = manager.drain().await {
        error!(error = ?err, "drain incomplete");
    }
    flush_task.await.context("flush loop join")?;
    if let Err(err) = server_task.await.context("server task join")? {
        error!(error = ?err, "observability server exited with error");
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "candle_aggregator=info,rdkafka=warn,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
