//! Bounded exponential back-off for transient failures

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Back-off policy shared by storage and transport callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_interval_ms: u64,
    /// Upper bound on a single delay
    pub max_interval_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Fraction of the delay used for random jitter (0.0 disables)
    pub randomization_factor: f64,
    /// Total retry budget; once exceeded the last error is returned
    pub max_elapsed_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 30_000,
            multiplier: 2.0,
            randomization_factor: 0.2,
            max_elapsed_ms: 300_000,
        }
    }
}

impl BackoffConfig {
    /// Grow a delay by the multiplier, capped at the maximum interval.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_millis() as f64 * self.multiplier;
        Duration::from_millis((grown as u64).min(self.max_interval_ms))
    }

    /// Randomize a delay by the configured factor.
    #[must_use]
    pub fn jitter(&self, delay: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return delay;
        }
        let spread = delay.as_millis() as f64 * self.randomization_factor;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let millis = (delay.as_millis() as f64 + offset).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

/// Run `op` until it succeeds or the elapsed budget is spent.
///
/// Returns the last error once `max_elapsed_ms` would be exceeded by the
/// next sleep. Every failure is logged at debug level, the give-up at warn.
pub async fn retry<T, E, F, Fut>(cfg: &BackoffConfig, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut delay = Duration::from_millis(cfg.initial_interval_ms);
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "operation recovered after retries");
                }
                return Ok(value);
            }
            Err(err) => {
                let budget = Duration::from_millis(cfg.max_elapsed_ms);
                if started.elapsed() + delay >= budget {
                    warn!(label, attempt, error = %err, "giving up after back-off");
                    return Err(err);
                }
                let jittered = cfg.jitter(delay);
                debug!(
                    label,
                    attempt,
                    delay_ms = jittered.as_millis() as u64,
                    error = %err,
                    "retrying after back-off"
                );
                sleep(jittered).await;
                delay = cfg.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
