//! Bounded retry with classification-dependent exponential backoff.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{CallError, ErrorClass};
use crate::clock::Clock;

/// Retry constants for one call-site.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first one
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  /// Growth factor after a `RateLimited` failure
  pub rate_limit_multiplier: f64,
  /// Growth factor after a `ServerTransient` failure
  pub server_error_multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 4,
      base_delay_ms: 10_000,
      rate_limit_multiplier: 4.0,
      server_error_multiplier: 2.0,
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
    Self {
      max_attempts,
      base_delay_ms,
      ..Self::default()
    }
  }

  /// Backoff before retry number `retry` (0-indexed) after a failure of `class`.
  ///
  /// Returns `None` for classes that are never retried.
  pub fn delay_for(&self, class: ErrorClass, retry: u32) -> Option<Duration> {
    if !class.is_retryable() {
      return None;
    }
    let multiplier = if class == ErrorClass::RateLimited {
      self.rate_limit_multiplier
    } else {
      self.server_error_multiplier
    };
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let millis = self.base_delay_ms as f64 * multiplier.powi(exponent);
    Some(Duration::from_millis(millis.round() as u64))
  }
}

/// Run `operation` until it succeeds, fails with a non-retryable class, or
/// `policy.max_attempts` attempts have failed.
///
/// The last failure is returned on exhaustion. `label` only names the call in logs.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  clock: &dyn Clock,
  label: &str,
  mut operation: F,
) -> Result<T, CallError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, CallError>>,
{
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt: u32 = 0;

  loop {
    let error = match operation().await {
      Ok(value) => {
        if attempt > 0 {
          debug!(call = label, attempts = attempt + 1, "Call succeeded after retry");
        }
        return Ok(value);
      }
      Err(error) => error,
    };

    let class = error.class();
    let Some(delay) = policy.delay_for(class, attempt) else {
      debug!(call = label, class = %class, error = %error, "Non-retryable failure");
      return Err(error);
    };

    attempt += 1;
    if attempt >= max_attempts {
      warn!(call = label, max_attempts, class = %class, error = %error, "Retries exhausted");
      return Err(error);
    }

    warn!(
      call = label,
      attempt,
      max_attempts,
      delay_ms = delay.as_millis() as u64,
      class = %class,
      "Completion service busy, backing off"
    );
    clock.sleep(delay).await;
  }
}
