//! Retry with exponential backoff for transient failures.
//!
//! Both the mailbox gateway and the chat-model client go through here.
//! Classification lives on the error types themselves via
//! [`Retryable::is_transient`]; permanent errors (auth, not-found,
//! validation, quota) are returned after the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::Retryable;

/// Exponential backoff policy: `base_delay * 2^attempt` with ±10% jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(cfg.max_retries, cfg.base_delay)
    }

    /// Smaller budget for the best-effort mark-as-read path.
    pub fn mark_read() -> Self {
        Self::new(2, Duration::from_millis(500))
    }

    /// Run `make_attempt` until it succeeds, fails permanently, or the
    /// retry budget is exhausted. The error from the last attempt is
    /// returned verbatim.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut make_attempt: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match make_attempt().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    debug!(operation, %err, "Permanent error, not retrying");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_retries => {
                    warn!(operation, attempts = attempt + 1, %err, "Retry budget exhausted");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.backoff(attempt);
                    warn!(operation, attempt, ?delay, %err, "Transient error, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`
    /// (0-based): `base * 2^attempt`, jittered by ±10%.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        Duration::from_millis((exp * jitter) as u64)
    }
}
