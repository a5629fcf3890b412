//! `POST /updates`.

use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::post};
use linkwatch_api::{ApiError, extract::ApiJson};
use linkwatch_core::update::LinkUpdate;
use tower_http::trace::TraceLayer;

use crate::delivery::Delivery;

pub fn router(delivery: Arc<Delivery>) -> Router {
  Router::new()
    .route("/updates", post(receive_update))
    .layer(TraceLayer::new_for_http())
    .with_state(delivery)
}

async fn receive_update(
  State(delivery): State<Arc<Delivery>>,
  ApiJson(update): ApiJson<LinkUpdate>,
) -> Result<StatusCode, ApiError> {
  update
    .validate()
    .map_err(|reason| ApiError::BadRequest(reason.to_owned()))?;
  delivery.deliver(&update).await;
  Ok(StatusCode::OK)
}
