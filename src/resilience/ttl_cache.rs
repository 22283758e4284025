//! Single-entry cache that serves a previous result until its TTL elapses.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use super::error::CallError;
use crate::clock::Clock;

/// What to do with an expired entry when the refresh fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePolicy {
  /// Return the refresh error
  #[default]
  Propagate,
  /// Return the expired entry, tagged as offline
  ServeStale,
}

/// Indicates where a cached value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched by this call
  Network,
  /// Served from an entry younger than the TTL
  CacheFresh,
  /// Refresh failed, serving an expired entry
  Offline,
}

/// Result from a cache read, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the returned value was fetched
  pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
  value: T,
  fetched_at: DateTime<Utc>,
}

/// TTL cache holding at most one entry.
///
/// Use one instance per cached query category. The entry is replaced whole on
/// every successful refresh and never removed.
pub struct TtlCache<T> {
  entry: Mutex<Option<CacheEntry<T>>>,
  ttl: Duration,
  stale_policy: StalePolicy,
  clock: Arc<dyn Clock>,
}

impl<T: Clone> TtlCache<T> {
  pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      entry: Mutex::new(None),
      ttl,
      stale_policy: StalePolicy::default(),
      clock,
    }
  }

  pub fn with_stale_policy(mut self, stale_policy: StalePolicy) -> Self {
    self.stale_policy = stale_policy;
    self
  }

  fn is_fresh(&self, fetched_at: DateTime<Utc>) -> bool {
    self.clock.now() - fetched_at < self.ttl
  }

  fn current(&self) -> Option<CacheEntry<T>> {
    self
      .entry
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Value of the current entry, fresh or not.
  #[cfg(test)]
  pub fn peek(&self) -> Option<T> {
    self.current().map(|entry| entry.value)
  }

  /// Return the cached value if it is younger than the TTL, otherwise run
  /// `refresh` and store its result.
  ///
  /// The lock is never held across the refresh.
  pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<CacheResult<T>, CallError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
  {
    let cached = self.current();

    if let Some(entry) = &cached {
      if self.is_fresh(entry.fetched_at) {
        debug!(fetched_at = %entry.fetched_at, "Serving cached value");
        return Ok(CacheResult {
          data: entry.value.clone(),
          source: CacheSource::CacheFresh,
          fetched_at: entry.fetched_at,
        });
      }
    }

    match refresh().await {
      Ok(value) => {
        let fetched_at = self.clock.now();
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = Some(CacheEntry {
          value: value.clone(),
          fetched_at,
        });
        Ok(CacheResult {
          data: value,
          source: CacheSource::Network,
          fetched_at,
        })
      }
      Err(error) => match (self.stale_policy, cached) {
        (StalePolicy::ServeStale, Some(entry)) => {
          warn!(error = %error, fetched_at = %entry.fetched_at, "Refresh failed, serving stale value");
          Ok(CacheResult {
            data: entry.value,
            source: CacheSource::Offline,
            fetched_at: entry.fetched_at,
          })
        }
        _ => Err(error),
      },
    }
  }
}

impl<T> std::fmt::Debug for TtlCache<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TtlCache")
      .field("ttl", &self.ttl)
      .field("stale_policy", &self.stale_policy)
      .finish_non_exhaustive()
  }
}
