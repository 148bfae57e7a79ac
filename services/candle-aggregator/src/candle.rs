//! OHLCV candle and in-flight bar state

use crate::interval::Interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services_common::{Px, Qty};

/// Aggregated OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Symbol
    pub symbol: String,
    /// Aggregation interval
    pub interval: Interval,
    /// Window start (aligned to the interval)
    pub open_time: DateTime<Utc>,
    /// Window end, exclusive
    pub close_time: DateTime<Utc>,
    /// Price of the first tick in the window
    pub open: Px,
    /// Highest price
    pub high: Px,
    /// Lowest price
    pub low: Px,
    /// Price of the most recent tick
    pub close: Px,
    /// Summed tick volume
    pub volume: Qty,
    /// Set exactly once at finalization
    pub complete: bool,
}

/// In-flight bar plus freshness tracking.
///
/// `updated_at` records the last tick time for flush-latency accounting;
/// finalization is driven by wall clock so silent symbols still close.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleState {
    /// The bar being built
    pub candle: Candle,
    /// Timestamp of the last applied tick
    pub updated_at: DateTime<Utc>,
}

impl CandleState {
    /// Open a new bar seeded from its first tick.
    #[must_use]
    pub fn new(
        symbol: String,
        interval: Interval,
        tick_time: DateTime<Utc>,
        price: Px,
        volume: Qty,
    ) -> Self {
        let open_time = interval.align(tick_time);
        Self::seeded(symbol, interval, open_time, tick_time, price, volume)
    }

    /// Open a new bar at an explicit window start.
    ///
    /// Used when a stale tick must be clamped forward into the live window
    /// so emitted open times stay strictly monotonic per slot.
    #[must_use]
    pub fn seeded(
        symbol: String,
        interval: Interval,
        open_time: DateTime<Utc>,
        tick_time: DateTime<Utc>,
        price: Px,
        volume: Qty,
    ) -> Self {
        let close_time = open_time + interval.duration();
        Self {
            candle: Candle {
                symbol,
                interval,
                open_time,
                close_time,
                open: price,
                high: price,
                low: price,
                close: price,
                volume,
                complete: false,
            },
            updated_at: tick_time,
        }
    }

    /// Rebuild state from a persisted partial bar.
    #[must_use]
    pub fn restore(candle: Candle, tick_time: DateTime<Utc>) -> Self {
        Self {
            candle,
            updated_at: tick_time,
        }
    }

    /// Apply a tick to the bar. `open` is never mutated.
    pub fn update(&mut self, tick_time: DateTime<Utc>, price: Px, volume: Qty) {
        let c = &mut self.candle;
        if price > c.high {
            c.high = price;
        }
        if price < c.low {
            c.low = price;
        }
        c.close = price;
        c.volume = c.volume.add(volume);
        self.updated_at = tick_time;
    }

    /// True once wall clock has crossed the window end.
    #[must_use]
    pub fn should_finalize(&self, now: DateTime<Utc>) -> bool {
        now >= self.candle.close_time
    }
}
