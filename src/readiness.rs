//! Readiness gate: block until an engine answers its health check.
//!
//! The gate is engine-agnostic. It takes the URL being probed (for logs
//! and the timeout error) and an async probe returning `true` once the
//! engine is healthy. Probe errors are the probe's business: a probe that
//! fails for any reason simply returns `false` and is retried.
//!
//! The budget doubles as an attempt cap: at most one attempt per poll
//! interval that fits in the timeout, and never past the deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ReadinessConfig;
use crate::error::{SeedError, SeedResult};

#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    pub timeout: Duration,
    pub interval: Duration,
    /// Per-attempt HTTP timeout handed to probes.
    pub attempt_timeout: Duration,
}

impl ReadinessGate {
    pub fn new(timeout: Duration, interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            timeout,
            interval,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &ReadinessConfig) -> Self {
        Self::new(
            config.timeout(),
            config.poll_interval(),
            config.attempt_timeout(),
        )
    }

    /// Maximum number of probe attempts within the budget (at least one).
    pub fn max_attempts(&self) -> u64 {
        let interval = self.interval.as_millis().max(1);
        let attempts = self.timeout.as_millis().div_ceil(interval);
        (attempts as u64).max(1)
    }

    /// Polls `probe` until it reports ready or the budget runs out.
    pub async fn wait<F, Fut>(&self, url: &str, mut probe: F) -> SeedResult<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        info!(url, "Waiting for engine");
        let start = Instant::now();
        let deadline = start + self.timeout;
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            let ready = tokio::time::timeout_at(deadline, probe())
                .await
                .unwrap_or(false);
            if ready {
                let elapsed = start.elapsed();
                info!(
                    url,
                    attempt,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Engine is ready"
                );
                return Ok(elapsed);
            }
            debug!(url, attempt, max_attempts, "Still waiting");

            if attempt == max_attempts || Instant::now() + self.interval > deadline {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }

        Err(SeedError::ReadinessTimeout {
            url: url.to_string(),
            elapsed: start.elapsed(),
        })
    }
}
