//! Handlers for `/tg-chat/{id}`.
//!
//! | Method   | Path            | Notes |
//! |----------|-----------------|-------|
//! | `POST`   | `/tg-chat/{id}` | Idempotent registration |
//! | `DELETE` | `/tg-chat/{id}` | 404 if unknown; collects orphaned links |

use axum::{
  extract::{Path, State},
  http::StatusCode,
};
use tracing::info;

use crate::{ApiStore, AppState, error::ApiError, links::invalidate};

/// `POST /tg-chat/{id}`
pub async fn register<S: ApiStore>(
  State(state): State<AppState<S>>,
  Path(chat_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  state
    .store
    .register_chat(chat_id)
    .await
    .map_err(ApiError::from_store)?;
  info!(chat_id, "chat registered");
  Ok(StatusCode::OK)
}

/// `DELETE /tg-chat/{id}`
pub async fn delete<S: ApiStore>(
  State(state): State<AppState<S>>,
  Path(chat_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  let collected = state
    .store
    .delete_chat(chat_id)
    .await
    .map_err(ApiError::from_store)?;
  invalidate(&state.links, chat_id).await;
  info!(chat_id, orphaned = collected.len(), "chat deleted");
  Ok(StatusCode::OK)
}
