//! Minimal Telegram Bot API client: `sendMessage` only.

use linkwatch_http::ResilientClient;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const SERVICE: &str = "telegram";

#[derive(Serialize)]
struct SendMessage<'a> {
  chat_id: i64,
  text:    &'a str,
}

#[derive(Deserialize)]
struct Reply {
  ok:          bool,
  description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
  client:   ResilientClient,
  endpoint: String,
}

impl TelegramClient {
  pub fn new(client: ResilientClient, api_url: &str, token: &str) -> Self {
    let endpoint = format!("{}/bot{token}/sendMessage", api_url.trim_end_matches('/'));
    Self { client, endpoint }
  }

  pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
    let request = self
      .client
      .http()
      .post(&self.endpoint)
      .json(&SendMessage { chat_id, text })
      .build()
      .map_err(linkwatch_http::Error::from)?;
    let reply: Reply = self.client.get_json(SERVICE, request).await?;
    if reply.ok {
      Ok(())
    } else {
      Err(Error::Telegram(reply.description.unwrap_or_else(|| "unknown error".into())))
    }
  }
}
