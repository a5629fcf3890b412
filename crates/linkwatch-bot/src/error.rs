//! Error type for `linkwatch-bot`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] linkwatch_core::Error),

  #[error("http error: {0}")]
  Http(#[from] linkwatch_http::Error),

  #[error("bus error: {0}")]
  Bus(#[from] linkwatch_bus::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("telegram rejected the message: {0}")]
  Telegram(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
