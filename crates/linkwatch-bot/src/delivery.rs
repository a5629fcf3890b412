//! Relays an update to every chat it addresses.

use linkwatch_core::update::LinkUpdate;
use tracing::{debug, warn};

use crate::telegram::TelegramClient;

pub struct Delivery {
  telegram: TelegramClient,
}

impl Delivery {
  pub fn new(telegram: TelegramClient) -> Self { Self { telegram } }

  /// Send `update` to each of its chats. Per-chat failures are logged;
  /// returns the number of chats reached.
  pub async fn deliver(&self, update: &LinkUpdate) -> usize {
    let text = render(update);
    let mut delivered = 0;
    for &chat_id in &update.tg_chat_ids {
      match self.telegram.send_message(chat_id, &text).await {
        Ok(()) => delivered += 1,
        Err(e) => warn!(chat_id, link_id = update.id, error = %e, "failed to deliver update"),
      }
    }
    debug!(link_id = update.id, delivered, total = update.tg_chat_ids.len(), "update relayed");
    delivered
  }
}

/// Message text for `update`.
pub fn render(update: &LinkUpdate) -> String {
  let mut text = update.description.clone();
  if !update.description.contains(&update.url) {
    text.push('\n');
    text.push_str(&update.url);
  }
  if let Some(info) = &update.update_info {
    text.push_str(&format!("\n\n{} by {}", info.title, info.author));
    if !info.text_preview.is_empty() {
      text.push('\n');
      text.push_str(&info.text_preview);
    }
  }
  text
}
