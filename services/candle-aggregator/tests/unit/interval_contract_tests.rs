//! Interval registry contract, parameterized across the canonical set

use candle_aggregator::Interval;
use chrono::{DateTime, Utc};
use rstest::*;

#[fixture]
fn reference_instant() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T13:47:23.456Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[rstest]
#[case(Interval::M1, 60)]
#[case(Interval::M5, 300)]
#[case(Interval::M15, 900)]
#[case(Interval::H1, 3_600)]
#[case(Interval::H4, 14_400)]
#[case(Interval::D1, 86_400)]
fn durations_match_wire_semantics(#[case] interval: Interval, #[case] secs: i64) {
    assert_eq!(interval.duration_secs(), secs);
    assert_eq!(interval.duration().num_seconds(), secs);
}

#[rstest]
#[case(Interval::M1, "2024-03-01T13:47:00Z")]
#[case(Interval::M5, "2024-03-01T13:45:00Z")]
#[case(Interval::M15, "2024-03-01T13:45:00Z")]
#[case(Interval::H1, "2024-03-01T13:00:00Z")]
#[case(Interval::H4, "2024-03-01T12:00:00Z")]
#[case(Interval::D1, "2024-03-01T00:00:00Z")]
fn alignment_truncates_to_the_window_start(
    reference_instant: DateTime<Utc>,
    #[case] interval: Interval,
    #[case] expected: &str,
) {
    let expected = DateTime::parse_from_rfc3339(expected)
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(interval.align(reference_instant), expected);
}

#[rstest]
#[case("1m", Interval::M1)]
#[case("5m", Interval::M5)]
#[case("15m", Interval::M15)]
#[case("1h", Interval::H1)]
#[case("4h", Interval::H4)]
#[case("1d", Interval::D1)]
fn wire_names_parse(#[case] name: &str, #[case] expected: Interval) {
    assert_eq!(name.parse::<Interval>().unwrap(), expected);
    assert_eq!(expected.as_str(), name);
}

#[rstest]
#[case("")]
#[case("2m")]
#[case("1w")]
#[case("60s")]
#[case("1M")]
fn names_outside_the_canonical_set_are_rejected(#[case] name: &str) {
    assert!(name.parse::<Interval>().is_err());
}
