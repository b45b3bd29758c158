//! Retry with exponential backoff
//!
//! `fetch_with_retry` drives a `Fetch` implementation, retrying `Retryable`
//! outcomes until the attempt cap is reached. Delays grow as
//! `base * multiplier^(n-1)` and are capped at `max_delay`.

use crate::config::RetryConfig;
use crate::crawler::fetcher::{Fetch, FetchOutcome, Payload};
use crate::crawler::stop::StopHandle;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Terminal failure of a fetch after the retry loop gave up
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The source answered with a non-retryable failure
    #[error("permanent failure: {reason}")]
    Permanent {
        status_code: Option<u16>,
        reason: String,
    },

    /// Every attempt hit a transient failure
    #[error("gave up after {attempts} attempts: {last_reason}")]
    TransientExhausted { attempts: u32, last_reason: String },

    /// The run was asked to stop before the fetch succeeded
    #[error("stopped before the fetch completed")]
    Stopped,
}

/// Backoff parameters for transient failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per URL, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `retry`, with jitter applied if enabled
    ///
    /// Jitter picks uniformly in `[delay / 2, delay]`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let max = delay.as_millis() as u64;
        let min = max / 2;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Fetches a URL, retrying transient failures per `policy`
///
/// # Arguments
///
/// * `fetcher` - Source of raw pages
/// * `url` - Target to fetch
/// * `policy` - Backoff parameters
/// * `stop` - Checked before every retry
///
/// # Returns
///
/// * `Ok(Payload)` - The page was retrieved
/// * `Err(FetchError::Permanent)` - A fatal outcome, never retried
/// * `Err(FetchError::TransientExhausted)` - `max_attempts` transient outcomes
/// * `Err(FetchError::Stopped)` - The run was stopped between attempts
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    url: &Url,
    policy: &RetryPolicy,
    stop: &StopHandle,
) -> Result<Payload, FetchError> {
    let mut attempt = 1;

    loop {
        match fetcher.fetch(url).await {
            FetchOutcome::Fetched(payload) => {
                debug!(url = %url, attempt, "fetched");
                return Ok(payload);
            }
            FetchOutcome::Fatal {
                status_code,
                reason,
            } => {
                return Err(FetchError::Permanent {
                    status_code,
                    reason,
                });
            }
            FetchOutcome::Retryable { reason, .. } => {
                if attempt >= policy.max_attempts {
                    return Err(FetchError::TransientExhausted {
                        attempts: attempt,
                        last_reason: reason,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    url = %url,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient fetch failure: {}",
                    reason
                );

                tokio::time::sleep(delay).await;
                if stop.is_stopped() {
                    return Err(FetchError::Stopped);
                }
                attempt += 1;
            }
        }
    }
}
