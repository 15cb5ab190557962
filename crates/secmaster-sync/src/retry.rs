//! Bounded exponential backoff for transient upstream failures.

use std::{fmt::Display, future::Future, time::Duration};

use serde::Deserialize;
use tokio::time::sleep;
use tracing::warn;

/// Retry settings, read from the `[retry]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_retries:   u32,
  pub base_delay_ms: u64,
  pub max_delay_ms:  u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self { max_retries: 3, base_delay_ms: 2_000, max_delay_ms: 10_000 }
  }
}

impl RetryConfig {
  /// `base * 2^attempt`, clamped to `max_delay_ms`.
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
    Duration::from_millis(millis)
  }
}

/// Errors that can tell whether trying again might help.
pub trait Transient {
  fn is_transient(&self) -> bool;
}

/// HTTP statuses worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
  matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
/// The last error is returned.
pub async fn retry_async<F, Fut, T, E>(
  config: &RetryConfig,
  operation_name: &str,
  mut operation: F,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: Transient + Display,
{
  let mut attempt = 0;
  loop {
    match operation().await {
      Ok(value) => return Ok(value),
      Err(error) if attempt < config.max_retries && error.is_transient() => {
        let delay = config.delay_for_attempt(attempt);
        warn!(
          operation = operation_name,
          attempt = attempt + 1,
          max_attempts = config.max_retries + 1,
          %error,
          ?delay,
          "transient failure, retrying"
        );
        sleep(delay).await;
        attempt += 1;
      }
      Err(error) => return Err(error),
    }
  }
}
