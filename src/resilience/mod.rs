//! Resilience wrapper for calls to an unreliable, rate-limited service.
//!
//! - [`with_retry`] retries throttling and 5xx failures with exponential backoff
//! - [`TtlCache`] serves a previous result until its time-to-live elapses
//! - [`CooldownGate`] rejects re-invocation faster than a minimum interval
//!
//! None of these spawn tasks or hold locks across an await; time comes from
//! a [`Clock`](crate::clock::Clock) so tests run without real sleeps.

mod cooldown;
mod error;
mod retry;
mod ttl_cache;

pub use cooldown::CooldownGate;
pub use error::{CallError, ErrorClass};
pub use retry::{with_retry, RetryPolicy};
pub use ttl_cache::{CacheResult, CacheSource, StalePolicy, TtlCache};
