//! Randomized tape vs a reference single-pass aggregator
//!
//! Seeded so failures reproduce. The manager's concatenated output for any
//! ordered tick sequence must match a straightforward group-by-window
//! aggregation of the same tape.

use crate::support::{harness, ts};
use candle_aggregator::{Interval, TradeEvent};
use chrono::{DateTime, Duration, Utc};
use services_common::{Px, Qty};
use std::collections::HashMap;

const INTERVALS: [Interval; 2] = [Interval::M1, Interval::M5];

#[derive(Debug, PartialEq)]
struct RefBar {
    open: Px,
    high: Px,
    low: Px,
    close: Px,
    volume: i64,
}

fn reference_bars(
    tape: &[TradeEvent],
    interval: Interval,
) -> HashMap<(String, DateTime<Utc>), RefBar> {
    let mut bars: HashMap<(String, DateTime<Utc>), RefBar> = HashMap::new();
    for event in tape {
        let key = (event.symbol.clone(), interval.align(event.timestamp));
        bars.entry(key)
            .and_modify(|bar| {
                bar.high = bar.high.max(event.price);
                bar.low = bar.low.min(event.price);
                bar.close = event.price;
                bar.volume += event.volume.as_i64();
            })
            .or_insert(RefBar {
                open: event.price,
                high: event.price,
                low: event.price,
                close: event.price,
                volume: event.volume.as_i64(),
            });
    }
    bars
}

fn random_tape(seed: u64, ticks: usize) -> Vec<TradeEvent> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];
    let start = ts("2024-03-01T12:00:00Z");

    let mut at = start;
    let mut tape = Vec::with_capacity(ticks);
    for _ in 0..ticks {
        // Time only moves forward, in uneven steps.
        at += Duration::milliseconds(rng.i64(50..4_000));
        tape.push(TradeEvent {
            symbol: symbols[rng.usize(0..symbols.len())].to_string(),
            price: Px::new(1_000.0 + rng.f64() * 500.0),
            volume: Qty::new(rng.f64() * 3.0),
            timestamp: at,
        });
    }
    tape
}

#[tokio::test]
async fn aggregation_matches_reference_for_random_tapes() {
    for seed in [7, 41, 1234] {
        let tape = random_tape(seed, 400);
        let h = harness(&INTERVALS, "2024-03-01T12:00:00Z");

        for event in &tape {
            h.feed(event).await;
        }
        // Push the clock far past the last window and close everything.
        let end = tape.last().unwrap().timestamp + Duration::minutes(10);
        h.clock.set_to(end);
        h.manager.flush_expired().await;

        for interval in INTERVALS {
            let expected = reference_bars(&tape, interval);

            let mut seen = 0usize;
            for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
                let emitted = h.sink.emitted_for(symbol, interval);
                for candle in &emitted {
                    let bar = expected
                        .get(&(symbol.to_string(), candle.open_time))
                        .unwrap_or_else(|| {
                            panic!("seed {seed}: unexpected {interval} bar at {}", candle.open_time)
                        });
                    assert_eq!(candle.open, bar.open, "seed {seed} {symbol} {interval} open");
                    assert_eq!(candle.high, bar.high, "seed {seed} {symbol} {interval} high");
                    assert_eq!(candle.low, bar.low, "seed {seed} {symbol} {interval} low");
                    assert_eq!(candle.close, bar.close, "seed {seed} {symbol} {interval} close");
                    assert_eq!(
                        candle.volume.as_i64(),
                        bar.volume,
                        "seed {seed} {symbol} {interval} volume"
                    );
                    assert!(candle.low <= candle.open && candle.open <= candle.high);
                    assert!(candle.low <= candle.close && candle.close <= candle.high);
                    seen += 1;
                }
                for pair in emitted.windows(2) {
                    assert!(pair[1].open_time > pair[0].open_time);
                }
            }
            assert_eq!(
                seen,
                expected.len(),
                "seed {seed}: every non-empty {interval} window emits exactly once"
            );
        }
    }
}
