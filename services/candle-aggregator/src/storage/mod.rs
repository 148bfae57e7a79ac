//! Partial-bar persistence
//!
//! In-flight bars are written through to an external key/value store after
//! every mutation so a restart can resume a bar mid-window. Store failures
//! are metered and logged but never block the live pipeline.

pub mod redis;

use crate::candle::Candle;
use crate::interval::Interval;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use redis::RedisPartialBarStore;

/// Partial-bar store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation
    #[error("partial-bar store unavailable: {0}")]
    Unavailable(String),
    /// A stored payload could not be encoded or decoded
    #[error("partial-bar payload corrupt: {0}")]
    Corrupt(String),
}

/// Key/value store for in-flight bars, keyed by `(symbol, interval, start)`.
#[async_trait]
pub trait PartialBarStore: Send + Sync {
    /// Idempotent upsert of an in-flight bar. TTL is at least twice the
    /// interval duration so a bar survives one full missed window.
    async fn save(&self, candle: &Candle) -> Result<(), StoreError>;

    /// Load the bar whose window encloses `ts`. Absence is not an error.
    async fn load_at(
        &self,
        symbol: &str,
        interval: Interval,
        ts: DateTime<Utc>,
    ) -> Result<Option<Candle>, StoreError>;

    /// Remove the bar whose window encloses `ts`. Missing keys are fine.
    async fn delete_at(
        &self,
        symbol: &str,
        interval: Interval,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
