//! Shared building blocks for market-data services

pub mod backoff;
pub mod identity;
pub mod types;

pub use backoff::{retry, BackoffConfig};
pub use identity::ServiceIdentity;
pub use types::{Px, Qty};
