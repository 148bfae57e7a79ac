//! Fan-out contract: every sink attempted, first error surfaced

use crate::support::{ts, RecordingSink};
use candle_aggregator::{Candle, CandleSink, Interval, MultiSink};
use services_common::{Px, Qty};
use std::sync::atomic::Ordering;

fn finalized_candle() -> Candle {
    Candle {
        symbol: "BTCUSDT".into(),
        interval: Interval::M1,
        open_time: ts("2024-03-01T12:00:00Z"),
        close_time: ts("2024-03-01T12:01:00Z"),
        open: Px::new(10.0),
        high: Px::new(12.0),
        low: Px::new(10.0),
        close: Px::new(11.0),
        volume: Qty::new(6.0),
        complete: true,
    }
}

#[tokio::test]
async fn delivers_to_every_sink() {
    let table = RecordingSink::named("table");
    let publisher = RecordingSink::named("publisher");
    let multi = MultiSink::new(vec![table.clone(), publisher.clone()]);

    multi.emit(&finalized_candle()).await.unwrap();

    assert_eq!(table.emitted().len(), 1);
    assert_eq!(publisher.emitted().len(), 1);
}

#[tokio::test]
async fn broken_sink_does_not_starve_the_others() {
    let table = RecordingSink::named("table");
    let publisher = RecordingSink::named("publisher");
    publisher.fail.store(true, Ordering::SeqCst);
    // Failing sink first: the table behind it must still receive the candle.
    let multi = MultiSink::new(vec![publisher.clone(), table.clone()]);

    let err = multi.emit(&finalized_candle()).await.expect_err("publisher down");
    assert!(err.to_string().contains("publisher"));

    assert_eq!(table.emitted().len(), 1);
    assert_eq!(publisher.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn first_error_wins_when_several_fail() {
    let a = RecordingSink::named("first");
    let b = RecordingSink::named("second");
    a.fail.store(true, Ordering::SeqCst);
    b.fail.store(true, Ordering::SeqCst);
    let multi = MultiSink::new(vec![a.clone(), b.clone()]);

    let err = multi.emit(&finalized_candle()).await.expect_err("both down");
    assert!(err.to_string().contains("first"));
    assert_eq!(a.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(b.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_fanout_is_a_no_op() {
    let multi = MultiSink::new(Vec::new());
    multi.emit(&finalized_candle()).await.unwrap();
}
