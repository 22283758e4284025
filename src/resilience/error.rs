//! Failure taxonomy for calls to the completion service.

use std::fmt;
use thiserror::Error;

/// Textual status the service uses when a quota is exhausted.
pub const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Coarse classification of a failed call, used to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
  /// The service signalled throttling (HTTP 429 or `RESOURCE_EXHAUSTED`)
  RateLimited,
  /// HTTP 5xx
  ServerTransient,
  /// Our own cooldown has not elapsed yet
  LocalRateLimited,
  /// The response body did not parse or validate
  Malformed,
  Other,
}

impl ErrorClass {
  /// Only server-signalled throttling and 5xx responses are worth retrying.
  pub fn is_retryable(self) -> bool {
    matches!(self, ErrorClass::RateLimited | ErrorClass::ServerTransient)
  }
}

impl fmt::Display for ErrorClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorClass::RateLimited => "rate-limited",
      ErrorClass::ServerTransient => "server-transient",
      ErrorClass::LocalRateLimited => "local-rate-limited",
      ErrorClass::Malformed => "malformed",
      ErrorClass::Other => "other",
    };
    f.write_str(name)
  }
}

/// A failed attempt against the completion service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
  #[error("Rate limited by completion service ({status}): {message}")]
  RateLimited { status: u16, message: String },

  #[error("Completion service error {status}: {message}")]
  ServerTransient { status: u16, message: String },

  #[error("Local Rate Limit: Please wait {remaining_ms}ms for node synchronization before next scan.")]
  LocalRateLimited { remaining_ms: i64 },

  #[error("Malformed response: {reason}")]
  Malformed { reason: String },

  #[error("{message}")]
  Other {
    status: Option<u16>,
    message: String,
  },
}

impl CallError {
  /// Classify an HTTP error response.
  ///
  /// `status_text` is the service's symbolic status (e.g. `RESOURCE_EXHAUSTED`)
  /// when the error body carried one.
  pub fn from_response(status: u16, status_text: Option<&str>, message: impl Into<String>) -> Self {
    let message = message.into();
    let exhausted = status_text == Some(RESOURCE_EXHAUSTED) || message.contains(RESOURCE_EXHAUSTED);

    if status == 429 || exhausted {
      CallError::RateLimited { status, message }
    } else if status >= 500 {
      CallError::ServerTransient { status, message }
    } else {
      CallError::Other {
        status: Some(status),
        message,
      }
    }
  }

  pub fn malformed(reason: impl fmt::Display) -> Self {
    CallError::Malformed {
      reason: reason.to_string(),
    }
  }

  /// Transport-level failure with no HTTP status (connect error, timeout, ...).
  pub fn transport(message: impl fmt::Display) -> Self {
    CallError::Other {
      status: None,
      message: message.to_string(),
    }
  }

  pub fn class(&self) -> ErrorClass {
    match self {
      CallError::RateLimited { .. } => ErrorClass::RateLimited,
      CallError::ServerTransient { .. } => ErrorClass::ServerTransient,
      CallError::LocalRateLimited { .. } => ErrorClass::LocalRateLimited,
      CallError::Malformed { .. } => ErrorClass::Malformed,
      CallError::Other { .. } => ErrorClass::Other,
    }
  }
}
