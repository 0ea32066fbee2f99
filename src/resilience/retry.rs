//! Retry policy with bounded timeout and exponential backoff
//!
//! Every external collaborator call (duplicate checks, option fetches,
//! deferred creations, pattern persistence) goes through this policy:
//! each attempt is wrapped in a timeout, and a failed attempt is
//! retried once after a jittered backoff delay.

use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Per-attempt timeout for the wrapped call
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Executes operations under [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute `operation` with timeout + retry. `label` shows up in
    /// log lines so fan-out failures stay attributable.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            let outcome = tokio::time::timeout(self.config.attempt_timeout, operation()).await;

            let error = match outcome {
                Ok(Ok(result)) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(result);
                }
                Ok(Err(e)) => e,
                Err(_) => anyhow::anyhow!(
                    "{} timed out after {:?}",
                    label,
                    self.config.attempt_timeout
                ),
            };

            if attempt == self.config.max_attempts {
                warn!(
                    "{} failed permanently on attempt {}: {}",
                    label, attempt, error
                );
                return Err(error);
            }

            warn!("{} failed on attempt {}, retrying: {}", label, attempt, error);
            last_error = Some(error);

            let delay = self.calculate_delay(attempt);
            debug!("Waiting {:?} before retrying {}", delay, label);
            tokio::time::sleep(delay).await;
        }

        // Unreachable with max_attempts >= 1, kept for completeness
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{} failed", label)))
    }

    /// Calculate exponential backoff delay with optional jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.config.base_delay.as_millis() as f64)
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let mut delay = Duration::from_millis(delay_ms as u64);

        if delay > self.config.max_delay {
            delay = self.config.max_delay;
        }

        if self.config.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            let jittered_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
            delay = Duration::from_millis(jittered_ms);
        }

        delay
    }
}
