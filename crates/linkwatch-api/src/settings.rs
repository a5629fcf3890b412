//! Handler for `POST /notification-settings`.

use axum::{extract::State, http::StatusCode};
use linkwatch_core::chat::{NotificationMode, NotificationSettings};
use serde::Deserialize;
use tracing::info;

use crate::{
  ApiStore, AppState,
  error::ApiError,
  extract::{ApiJson, ChatId},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
  /// `instant` or `digest`, case-insensitive.
  pub mode:          String,
  pub digest_hour:   Option<u32>,
  pub digest_minute: Option<u32>,
}

/// `POST /notification-settings` — header `Tg-Chat-Id`
pub async fn update<S: ApiStore>(
  State(state): State<AppState<S>>,
  ChatId(chat_id): ChatId,
  ApiJson(body): ApiJson<SettingsBody>,
) -> Result<StatusCode, ApiError> {
  let mode: NotificationMode = body
    .mode
    .trim()
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unknown notification mode {:?}", body.mode)))?;
  let settings = NotificationSettings::new(mode, body.digest_hour, body.digest_minute)?;

  let chat = state
    .store
    .update_notification_settings(chat_id, settings)
    .await
    .map_err(ApiError::from_store)?;
  info!(chat_id, mode = %chat.mode, "notification settings updated");
  Ok(StatusCode::OK)
}
