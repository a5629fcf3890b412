//! Error type for `linkwatch-cache`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("cached value is not valid json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("key {0} holds a value of the wrong kind")]
  WrongKind(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
