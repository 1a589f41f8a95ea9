//! Exponential backoff around a whole operation, retrying only transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Transient;

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

/// `max_attempts` counts the first call. Delay before attempt `n + 1` is
/// `base_delay * 2^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or attempts run out.
/// Each retry is a fresh call; nothing from the failed attempt is cleaned up here.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "service unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(attempts = attempt, error = %err, "all retry attempts failed");
                }
                return Err(err);
            }
        }
    }
}
