//! Exponential backoff with jitter for remote transfers.

use crate::config::NetworkConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently a failed transfer is retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles with every further attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Scale each delay by a random factor so clients do not retry in step.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_RETRIES,
            base_delay: NetworkConfig::RETRY_BASE_DELAY,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Defaults from [`NetworkConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts. At least one is always made.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the delay before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the cap for a single delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed): `base * 2^attempt`,
    /// capped, scaled by a random factor in `[0.5, 1.5)` when jitter is on.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let uncapped = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = uncapped.min(self.max_delay.as_secs_f64());
        let secs = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            (capped * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts. Returns the last result and the number of attempts.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        let result = operation().await;
        attempt += 1;

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Succeeded after {} attempts", attempt);
                }
                return (Ok(value), attempt);
            }
            Err(e) => e,
        };

        if !should_retry(&err) {
            return (Err(err), attempt);
        }
        if attempt >= config.max_attempts {
            warn!("Giving up after {} attempts: {}", attempt, err);
            return (Err(err), attempt);
        }

        let delay = config.delay_for(attempt - 1);
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt, config.max_attempts, err, delay
        );
        tokio::time::sleep(delay).await;
    }
}
