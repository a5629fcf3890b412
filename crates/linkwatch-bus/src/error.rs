//! Error type for `linkwatch-bus`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("invalid record headers: {0}")]
  Headers(#[from] serde_json::Error),

  #[error("append not acknowledged within {0:?}")]
  Timeout(Duration),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
