//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error is rendered as
//! `{"description": ..., "code": "<status>", "exceptionMessage": ...}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use linkwatch_core::store::StoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a store error to a status by the domain kind it carries.
  pub fn from_store<E: StoreError>(err: E) -> Self {
    match err.domain() {
      Some(domain) => Self::from(domain),
      None => ApiError::Store(Box::new(err)),
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn description(&self) -> &'static str {
    match self {
      ApiError::BadRequest(_) => "Invalid request",
      ApiError::NotFound(_) => "Resource not found",
      ApiError::Conflict(_) => "Resource already exists",
      ApiError::Store(_) => "Internal error",
    }
  }
}

impl From<&linkwatch_core::Error> for ApiError {
  fn from(err: &linkwatch_core::Error) -> Self {
    use linkwatch_core::Error as E;
    let message = err.to_string();
    match err {
      E::InvalidUrl(_)
      | E::UnsupportedLinkType(_)
      | E::DigestTimeRequired
      | E::InvalidDigestTime { .. }
      | E::Serialization(_) => ApiError::BadRequest(message),
      E::LinkNotFound(_)
      | E::ChatNotFound(_)
      | E::TagNotFound { .. }
      | E::DetailsNotFound(_) => ApiError::NotFound(message),
      E::LinkAlreadyExists(_) | E::TagAlreadyExists { .. } => ApiError::Conflict(message),
    }
  }
}

impl From<linkwatch_core::Error> for ApiError {
  fn from(err: linkwatch_core::Error) -> Self { Self::from(&err) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let message = match &self {
      ApiError::BadRequest(m) | ApiError::NotFound(m) | ApiError::Conflict(m) => m.clone(),
      ApiError::Store(e) => e.to_string(),
    };
    let body = json!({
      "description":      self.description(),
      "code":             status.as_u16().to_string(),
      "exceptionMessage": message,
    });
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn domain_kinds_map_to_statuses() {
    use linkwatch_core::Error as E;
    let cases = [
      (E::InvalidUrl("x".into()), StatusCode::BAD_REQUEST),
      (E::UnsupportedLinkType("x".into()), StatusCode::BAD_REQUEST),
      (E::DigestTimeRequired, StatusCode::BAD_REQUEST),
      (E::LinkAlreadyExists("x".into()), StatusCode::CONFLICT),
      (E::TagAlreadyExists { link_id: 1, tag: "t".into() }, StatusCode::CONFLICT),
      (E::LinkNotFound("x".into()), StatusCode::NOT_FOUND),
      (E::ChatNotFound(1), StatusCode::NOT_FOUND),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).status(), status);
    }
  }
}
