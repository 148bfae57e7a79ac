//! Multi-interval aggregation manager
//!
//! Holds one in-flight bar per `(interval, symbol)` slot under a single
//! mutex. Ticks mutate slots on the ingest path; a timer sweep closes bars
//! whose window has passed even when a symbol goes silent. Every mutation is
//! written through to the partial-bar store so a restart resumes mid-window.

use crate::candle::CandleState;
use crate::clock::Clock;
use crate::ingest::TradeEvent;
use crate::interval::Interval;
use crate::metrics::Metrics;
use crate::sinks::CandleSink;
use crate::storage::PartialBarStore;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

type Bucket = FxHashMap<String, CandleState>;

/// Stateful engine turning a trade stream into finalized candles.
pub struct AggregationManager {
    buckets: Mutex<FxHashMap<Interval, Bucket>>,
    intervals: Vec<Interval>,
    sink: Arc<dyn CandleSink>,
    store: Arc<dyn PartialBarStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    flush_interval: Duration,
    drain_timeout: Duration,
}

impl AggregationManager {
    /// Build a manager with one pre-created bucket per configured interval.
    #[must_use]
    pub fn new(
        intervals: Vec<Interval>,
        sink: Arc<dyn CandleSink>,
        store: Arc<dyn PartialBarStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        flush_interval: Duration,
        drain_timeout: Duration,
    ) -> Self {
        let mut buckets = FxHashMap::default();
        for interval in &intervals {
            buckets.insert(*interval, Bucket::default());
        }
        Self {
            buckets: Mutex::new(buckets),
            intervals,
            sink,
            store,
            clock,
            metrics,
            flush_interval,
            drain_timeout,
        }
    }

    /// Apply one trade to every configured interval.
    ///
    /// Safe for concurrent callers; all slot mutation happens under the
    /// bucket mutex. Never fails for per-slot reasons: sink and store
    /// errors are logged and metered, and the tick is still accepted.
    pub async fn process(&self, trade: &TradeEvent) -> anyhow::Result<()> {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().await;

        for &interval in &self.intervals {
            let bucket = buckets.entry(interval).or_default();
            self.apply_to_slot(bucket, interval, trade, now).await;
            self.metrics
                .processed_total
                .with_label_values(&[interval.as_str()])
                .inc();
        }

        Ok(())
    }

    async fn apply_to_slot(
        &self,
        bucket: &mut Bucket,
        interval: Interval,
        trade: &TradeEvent,
        now: DateTime<Utc>,
    ) {
        match bucket.get_mut(&trade.symbol) {
            None => {
                let state = self.open_slot(interval, trade, now).await;
                self.save_partial(&state).await;
                bucket.insert(trade.symbol.clone(), state);
            }
            Some(state) => {
                let rolls = state.should_finalize(now)
                    || interval.align(trade.timestamp) > state.candle.open_time;
                if rolls {
                    let closed_start = state.candle.open_time;
                    if let Some(closed) = bucket.remove(&trade.symbol) {
                        let _ = self.finalize_slot(interval, &trade.symbol, closed, now).await;
                    }

                    let mut fresh = CandleState::new(
                        trade.symbol.clone(),
                        interval,
                        trade.timestamp,
                        trade.price,
                        trade.volume,
                    );
                    if fresh.candle.open_time <= closed_start {
                        // Stale tick after a wall-clock close: clamp into the
                        // next window so emitted open times stay monotonic.
                        fresh = CandleState::seeded(
                            trade.symbol.clone(),
                            interval,
                            closed_start + interval.duration(),
                            trade.timestamp,
                            trade.price,
                            trade.volume,
                        );
                    }
                    self.save_partial(&fresh).await;
                    bucket.insert(trade.symbol.clone(), fresh);
                } else {
                    // Ticks older than the bar start are clamped into the
                    // current bar; `open_time` is untouched by update.
                    state.update(trade.timestamp, trade.price, trade.volume);
                    self.save_partial(state).await;
                }
            }
        }
    }

    /// First tick for a slot: restore the persisted partial bar if one
    /// exists for this window, otherwise open a fresh bar.
    async fn open_slot(
        &self,
        interval: Interval,
        trade: &TradeEvent,
        now: DateTime<Utc>,
    ) -> CandleState {
        let restored = match self
            .store
            .load_at(&trade.symbol, interval, trade.timestamp)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                self.metrics
                    .restore_errors_total
                    .with_label_values(&[interval.as_str()])
                    .inc();
                warn!(
                    symbol = %trade.symbol,
                    interval = %interval,
                    error = %err,
                    "partial-bar restore failed; opening fresh bar"
                );
                None
            }
        };

        match restored {
            Some(candle) if candle.close_time > trade.timestamp => {
                let mut state = CandleState::restore(candle, trade.timestamp);
                state.update(trade.timestamp, trade.price, trade.volume);
                state
            }
            Some(candle) => {
                // The stored bar's window already passed; close it out and
                // start over from the tick.
                let state = CandleState::restore(candle, trade.timestamp);
                let _ = self.finalize_slot(interval, &trade.symbol, state, now).await;
                CandleState::new(
                    trade.symbol.clone(),
                    interval,
                    trade.timestamp,
                    trade.price,
                    trade.volume,
                )
            }
            None => CandleState::new(
                trade.symbol.clone(),
                interval,
                trade.timestamp,
                trade.price,
                trade.volume,
            ),
        }
    }

    /// Close every bar whose window has passed. Called by the timer sweep.
    pub async fn flush_expired(&self) {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().await;

        for &interval in &self.intervals {
            let bucket = buckets.entry(interval).or_default();
            let due: Vec<String> = bucket
                .iter()
                .filter(|(_, state)| state.should_finalize(now))
                .map(|(symbol, _)| symbol.clone())
                .collect();

            for symbol in due {
                if let Some(state) = bucket.remove(&symbol) {
                    let _ = self.finalize_slot(interval, &symbol, state, now).await;
                }
            }
        }
    }

    /// Close every remaining bar regardless of window, joining errors.
    async fn flush_all(&self) -> anyhow::Result<()> {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().await;
        let mut failures: Vec<String> = Vec::new();

        for &interval in &self.intervals {
            let bucket = buckets.entry(interval).or_default();
            let symbols: Vec<String> = bucket.keys().cloned().collect();
            for symbol in symbols {
                if let Some(state) = bucket.remove(&symbol) {
                    if let Err(err) = self.finalize_slot(interval, &symbol, state, now).await {
                        failures.push(format!("{interval}/{symbol}: {err:#}"));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "{} candle(s) failed to flush: {}",
                failures.len(),
                failures.join("; ")
            ))
        }
    }

    /// Drain all in-flight bars within the configured deadline.
    ///
    /// Bars left unflushed at the deadline are abandoned; the partial-bar
    /// store restores them after the next start.
    pub async fn drain(&self) -> anyhow::Result<()> {
        info!("draining in-flight bars");
        match tokio::time::timeout(self.drain_timeout, self.flush_all()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "drain deadline exceeded; remaining bars will restore from the partial-bar store"
                );
                Err(anyhow!("aggregator drain timed out"))
            }
        }
    }

    /// Mark complete, emit to the sink fan-out, drop the persisted partial
    /// bar and record flush metrics. The returned error is the sink's; the
    /// bar is considered produced either way and is never re-queued.
    async fn finalize_slot(
        &self,
        interval: Interval,
        symbol: &str,
        mut state: CandleState,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        state.candle.complete = true;
        let label = interval.as_str();

        let emitted = self.sink.emit(&state.candle).await;
        if let Err(err) = &emitted {
            error!(
                symbol,
                interval = label,
                start = %state.candle.open_time,
                error = ?err,
                "candle emission failed"
            );
        }

        if let Err(err) = self
            .store
            .delete_at(symbol, interval, state.candle.open_time)
            .await
        {
            warn!(symbol, interval = label, error = %err, "partial-bar delete failed");
        }

        self.metrics
            .flushed_total
            .with_label_values(&[label])
            .inc();
        let latency_secs = (now - state.updated_at).num_milliseconds() as f64 / 1_000.0;
        self.metrics
            .flush_latency
            .with_label_values(&[label])
            .observe(latency_secs.max(0.0));
        self.metrics
            .last_flush_timestamp
            .with_label_values(&[label])
            .set(now.timestamp() as f64);

        debug!(symbol, interval = label, start = %state.candle.open_time, "finalized candle");
        emitted
    }

    async fn save_partial(&self, state: &CandleState) {
        if let Err(err) = self.store.save(&state.candle).await {
            warn!(
                symbol = %state.candle.symbol,
                interval = %state.candle.interval,
                error = %err,
                "partial-bar save failed"
            );
        }
    }

    /// Spawn the timer sweep. Stops when the shutdown signal flips.
    pub fn spawn_flush_loop(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.flush_expired().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("flush loop stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
