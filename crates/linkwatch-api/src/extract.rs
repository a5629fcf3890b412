//! Extractors that reject with [`ApiError`] instead of axum's plain-text
//! rejections.

use axum::{
  Json,
  extract::{FromRequest, FromRequestParts, Query, Request, rejection::JsonRejection},
  http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const CHAT_ID_HEADER: &str = "Tg-Chat-Id";

/// The chat id carried in the `Tg-Chat-Id` header.
pub struct ChatId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for ChatId {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let raw = parts
      .headers
      .get(CHAT_ID_HEADER)
      .ok_or_else(|| ApiError::BadRequest(format!("missing {CHAT_ID_HEADER} header")))?;
    raw
      .to_str()
      .ok()
      .and_then(|v| v.trim().parse().ok())
      .map(ChatId)
      .ok_or_else(|| ApiError::BadRequest(format!("malformed {CHAT_ID_HEADER} header")))
  }
}

/// JSON body extractor.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
  Json<T>: FromRequest<S, Rejection = JsonRejection>,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let Json(value) = Json::<T>::from_request(req, state)
      .await
      .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Self(value))
  }
}

/// Query-string extractor.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let Query(value) = Query::<T>::from_request_parts(parts, state)
      .await
      .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Self(value))
  }
}
