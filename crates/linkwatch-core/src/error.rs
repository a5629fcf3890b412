//! Error types for `linkwatch-core`.
//!
//! These are the domain-stable error kinds. Storage backends wrap them so
//! that the API layer can map each kind to an HTTP status.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid url: {0}")]
  InvalidUrl(String),

  #[error("unsupported link type: {0}")]
  UnsupportedLinkType(String),

  #[error("link already exists: {0}")]
  LinkAlreadyExists(String),

  #[error("link not found: {0}")]
  LinkNotFound(String),

  #[error("chat not found: {0}")]
  ChatNotFound(i64),

  #[error("tag {tag:?} already exists on link {link_id}")]
  TagAlreadyExists { link_id: i64, tag: String },

  #[error("tag {tag:?} not found on link {link_id}")]
  TagNotFound { link_id: i64, tag: String },

  #[error("content details not found for {0}")]
  DetailsNotFound(String),

  #[error("digest mode requires a digest time")]
  DigestTimeRequired,

  #[error("invalid digest time {hour:02}:{minute:02}")]
  InvalidDigestTime { hour: u32, minute: u32 },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
