use async_trait::async_trait;
use linkwatch_core::update::LinkUpdate;
use linkwatch_http::ResilientClient;

use super::Notifier;
use crate::Result;

const SERVICE: &str = "bot";

/// Posts updates to `{bot_url}/updates`.
pub struct HttpNotifier {
  client:   ResilientClient,
  endpoint: String,
}

impl HttpNotifier {
  pub fn new(client: ResilientClient, bot_url: &str) -> Self {
    Self { client, endpoint: format!("{}/updates", bot_url.trim_end_matches('/')) }
  }
}

#[async_trait]
impl Notifier for HttpNotifier {
  fn name(&self) -> &'static str { "http" }

  async fn send(&self, update: &LinkUpdate) -> Result<()> {
    self.client.post_json(SERVICE, &self.endpoint, update).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

  use super::*;
  use crate::testing::{resilient_client, sample_update, serve};

  #[tokio::test]
  async fn posts_update_json() {
    let received: Arc<Mutex<Vec<LinkUpdate>>> = Arc::default();
    let app = Router::new()
      .route(
        "/updates",
        post(|State(seen): State<Arc<Mutex<Vec<LinkUpdate>>>>, Json(u): Json<LinkUpdate>| async move {
          seen.lock().unwrap().push(u);
          StatusCode::OK
        }),
      )
      .with_state(received.clone());
    let base = serve(app).await;

    let notifier = HttpNotifier::new(resilient_client(), &format!("{base}/"));
    notifier.send(&sample_update(7, &[1, 2])).await.unwrap();

    let seen = received.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, 7);
    assert_eq!(seen[0].tg_chat_ids, vec![1, 2]);
  }

  #[tokio::test]
  async fn rejected_update_is_an_error() {
    let app = Router::new().route("/updates", post(|| async { StatusCode::BAD_REQUEST }));
    let base = serve(app).await;

    let notifier = HttpNotifier::new(resilient_client(), &base);
    let err = notifier.send(&sample_update(1, &[1])).await.unwrap_err();
    assert!(matches!(
      err,
      crate::Error::Http(linkwatch_http::Error::Status { status: 400, .. })
    ));
  }
}
