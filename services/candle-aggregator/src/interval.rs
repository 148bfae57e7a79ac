//! Canonical aggregation intervals
//!
//! The interval set is closed: configuration naming anything else is
//! rejected at startup. Alignment truncates toward the UTC epoch, so every
//! bar boundary is a whole multiple of the interval duration.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported aggregation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute bars
    #[serde(rename = "1m")]
    M1,
    /// 5 minute bars
    #[serde(rename = "5m")]
    M5,
    /// 15 minute bars
    #[serde(rename = "15m")]
    M15,
    /// 1 hour bars
    #[serde(rename = "1h")]
    H1,
    /// 4 hour bars
    #[serde(rename = "4h")]
    H4,
    /// Daily bars
    #[serde(rename = "1d")]
    D1,
}

/// Returned when a configured interval is outside the canonical set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported interval {0:?}")]
pub struct ParseIntervalError(pub String);

impl Interval {
    /// Every supported interval, shortest first.
    pub const ALL: [Interval; 6] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::H1,
        Interval::H4,
        Interval::D1,
    ];

    /// Get duration in seconds
    #[must_use]
    pub const fn duration_secs(&self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::H1 => 3600,
            Interval::H4 => 14400,
            Interval::D1 => 86400,
        }
    }

    /// Get chrono duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs())
    }

    /// Wire name, e.g. `"5m"`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    /// Truncate `ts` down to the enclosing bar boundary.
    #[must_use]
    pub fn align(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.duration_secs();
        let aligned = ts.timestamp().div_euclid(step) * step;
        DateTime::from_timestamp(aligned, 0).unwrap_or(ts)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            other => Err(ParseIntervalError(other.to_string())),
        }
    }
}
