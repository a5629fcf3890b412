//! Error type for `linkwatch-http`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("request to {service} timed out")]
  Timeout { service: String },

  #[error("{service} kept failing with status {status} after retries")]
  Upstream { service: String, status: u16 },

  #[error("circuit breaker for {0} is open")]
  BreakerOpen(String),

  #[error("{service} answered with status {status}")]
  Status { service: String, status: u16 },

  #[error("cannot decode response body: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("request body cannot be replayed")]
  Unreplayable,
}

impl Error {
  /// Status code carried by the error, if the upstream answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      Error::Upstream { status, .. } | Error::Status { status, .. } => Some(*status),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
