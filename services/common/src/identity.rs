//! Explicit service identity
//!
//! Passed by value to every component that labels telemetry, instead of a
//! process-wide mutable service name.

/// Name and version of the running service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Service name, e.g. `candle-aggregator`
    pub name: String,
    /// Service version, e.g. `0.1.0`
    pub version: String,
}

impl ServiceIdentity {
    /// Create a new identity
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Metric namespace derived from the service name.
    ///
    /// Prometheus metric names cannot contain `-`.
    #[must_use]
    pub fn metrics_namespace(&self) -> String {
        self.name.replace('-', "_")
    }
}
