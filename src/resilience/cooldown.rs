//! Client-side minimum interval between successful invocations.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::error::CallError;
use crate::clock::Clock;

/// Rejects an operation that last succeeded less than `min_interval` ago.
///
/// Only successful completions move the gate, so a failed scan can be
/// retried by the user straight away.
pub struct CooldownGate {
  min_interval: Duration,
  last_success: Mutex<Option<DateTime<Utc>>>,
  clock: Arc<dyn Clock>,
}

impl CooldownGate {
  pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      min_interval,
      last_success: Mutex::new(None),
      clock,
    }
  }

  /// Fail with `LocalRateLimited` if the cooldown is still running.
  pub fn check(&self) -> Result<(), CallError> {
    let last = *self
      .last_success
      .lock()
      .unwrap_or_else(PoisonError::into_inner);

    let Some(last) = last else {
      return Ok(());
    };

    let elapsed = self.clock.now() - last;
    if elapsed < self.min_interval {
      let remaining_ms = (self.min_interval - elapsed).num_milliseconds();
      debug!(remaining_ms, "Cooldown active, rejecting call");
      return Err(CallError::LocalRateLimited { remaining_ms });
    }
    Ok(())
  }

  fn record_success(&self) {
    *self
      .last_success
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = Some(self.clock.now());
  }

  /// Run `operation` if the gate is open, recording the completion time on success.
  pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, CallError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
  {
    self.check()?;
    let value = operation().await?;
    self.record_success();
    Ok(value)
  }
}

impl std::fmt::Debug for CooldownGate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CooldownGate")
      .field("min_interval", &self.min_interval)
      .field("last_success", &self.last_success)
      .finish_non_exhaustive()
  }
}
