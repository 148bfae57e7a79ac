//! Fixed-point value types shared across services
//!
//! Prices and quantities are carried as i64 ticks (4 decimal places) so that
//! aggregation arithmetic stays deterministic. Conversion to `f64` happens
//! only at system boundaries (wire decoding, SQL columns).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticks per whole unit (4 decimal places).
const SCALE: i64 = 10_000;

/// Price in ticks (1 tick = 0.0001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Px(i64);

impl Px {
    /// Zero price
    pub const ZERO: Self = Self(0);

    /// Create a price from a float at the system boundary.
    ///
    /// Values outside the representable range are clamped.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(scale_f64(value))
    }

    /// Create from raw i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Get raw i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Get price as f64 for external APIs only
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / SCALE as f64
        }
    }

    /// True iff the price is strictly positive
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = (self.0 % SCALE).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

/// Quantity in ticks (1 tick = 0.0001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qty(i64);

impl Qty {
    /// Zero quantity
    pub const ZERO: Self = Self(0);

    /// Create a quantity from a float at the system boundary.
    ///
    /// Values outside the representable range are clamped.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(scale_f64(value))
    }

    /// Create from raw i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from whole units
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * SCALE)
    }

    /// Get raw i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Get quantity as f64 for external APIs only
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / SCALE as f64
        }
    }

    /// Saturating sum of two quantities
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// True iff the quantity is negative
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = (self.0 % SCALE).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

/// Scale a boundary f64 into ticks, clamping out-of-range values.
fn scale_f64(value: f64) -> i64 {
    let scaled = (value * SCALE as f64).round();
    const MAX_SAFE: f64 = 9_223_372_036_854_775_807.0;
    const MIN_SAFE: f64 = -9_223_372_036_854_775_808.0;

    if scaled >= MAX_SAFE {
        i64::MAX
    } else if scaled <= MIN_SAFE {
        i64::MIN
    } else {
        #[allow(clippy::cast_possible_truncation)]
        {
            scaled as i64
        }
    }
}
