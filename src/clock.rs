//! Time source used by the resilience layer.
//!
//! Everything that reads "now" or waits out a backoff goes through [`Clock`],
//! so tests can drive retries, TTL expiry and cooldowns without real sleeps.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::time::Duration;

/// Wall clock plus an async sleep.
pub trait Clock: Send + Sync {
  /// Current wall-clock time.
  fn now(&self) -> DateTime<Utc>;

  /// Wait for `duration`.
  fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real clock backed by `chrono::Utc` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(tokio::time::sleep(duration))
  }
}

#[cfg(test)]
pub use manual::ManualClock;
