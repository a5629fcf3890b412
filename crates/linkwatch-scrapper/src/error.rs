//! Error type for `linkwatch-scrapper`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] linkwatch_core::Error),

  #[error("http error: {0}")]
  Http(#[from] linkwatch_http::Error),

  #[error("bus error: {0}")]
  Bus(#[from] linkwatch_bus::Error),

  #[error("cache error: {0}")]
  Cache(#[from] linkwatch_cache::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("unexpected upstream response: {0}")]
  Upstream(String),
}

impl Error {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    Error::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
