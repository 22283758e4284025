//! Caller-owned async fetch state and cancellable polling.
//!
//! The oracle only exposes single-shot fetches. The watch loop wraps them in a
//! `Query<T>` so a slow completion call never blocks the loop, and drives
//! repeated work with `Periodic` tasks it can cancel.
//!
//! # Example
//!
//! ```ignore
//! let oracle = oracle.clone();
//! let mut snapshot = Query::new(move || {
//!     let oracle = oracle.clone();
//!     async move { oracle.fetch_global_market_snapshot().await }
//! });
//!
//! snapshot.fetch();
//!
//! // In the event loop tick
//! if snapshot.poll() {
//!     print_snapshot(snapshot.state());
//! }
//! ```

use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::resilience::CallError;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed
  Error(CallError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&CallError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, CallError>> + Send + Sync>;

/// One async fetch at a time, with its result delivered through a channel
/// and picked up by `poll()`.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, CallError>>>,
  /// Last successful value, kept while a new fetch is loading or after it fails
  last_data: Option<T>,
}

impl<T: Clone + Send + 'static> Query<T> {
  /// Create a query around `fetcher`, called on every `fetch()`.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CallError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      last_data: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Most recent successful value, even while reloading or after an error.
  pub fn last_data(&self) -> Option<&T> {
    self.last_data.as_ref()
  }

  /// Start fetching unless a fetch is already in flight.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Pick up the result of a pending fetch.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.last_data = Some(data.clone());
        self.state = QueryState::Success(data);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Task panicked or was aborted before sending
        self.state = QueryState::Error(CallError::transport("query task ended without a result"));
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    tokio::spawn(async move {
      // Receiver is gone if the query was dropped
      let _ = tx.send(future.await);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("last_data", &self.last_data)
      .finish_non_exhaustive()
  }
}

/// A task running `action` every `period` until cancelled or dropped.
///
/// The first run happens one full period after spawning.
#[derive(Debug)]
pub struct Periodic {
  handle: JoinHandle<()>,
}

impl Periodic {
  pub fn spawn<F>(period: Duration, mut action: F) -> Self
  where
    F: FnMut() -> bool + Send + 'static,
  {
    let handle = tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        interval.tick().await;
        // `action` returns false once nobody is listening
        if !action() {
          break;
        }
      }
    });
    Self { handle }
  }

  pub fn cancel(&self) {
    self.handle.abort();
  }

  #[cfg(test)]
  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }
}

impl Drop for Periodic {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
