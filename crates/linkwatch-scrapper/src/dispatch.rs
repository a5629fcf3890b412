//! Fan-out of a detected update to its subscribers.

use std::sync::Arc;

use linkwatch_cache::LinkListCache;
use linkwatch_core::{chat::Chat, update::LinkUpdate};
use tracing::{debug, warn};

use crate::{digest::DigestBuffer, notifier::Notifier};

pub struct Dispatcher {
  notifier: Arc<dyn Notifier>,
  links:    LinkListCache,
  digest:   Option<Arc<DigestBuffer>>,
}

impl Dispatcher {
  /// `digest` is `None` when digests are disabled; every chat is then
  /// notified immediately.
  pub fn new(
    notifier: Arc<dyn Notifier>,
    links: LinkListCache,
    digest: Option<Arc<DigestBuffer>>,
  ) -> Self {
    Self { notifier, links, digest }
  }

  /// Deliver `update` to `chats`.
  ///
  /// Every subscriber's link-list cache is invalidated first. Failures
  /// are logged and never returned.
  pub async fn dispatch(&self, update: &LinkUpdate, chats: &[Chat]) {
    for chat in chats {
      if let Err(e) = self.links.invalidate(chat.chat_id).await {
        warn!(chat_id = chat.chat_id, error = %e, "failed to invalidate link cache");
      }
    }

    let mut instant = Vec::with_capacity(chats.len());
    for chat in chats {
      match &self.digest {
        Some(digest) if chat.wants_digest() => {
          if let Err(e) = digest.push(chat.chat_id, update).await {
            warn!(chat_id = chat.chat_id, link_id = update.id, error = %e, "failed to buffer digest entry");
          }
        }
        _ => instant.push(chat.chat_id),
      }
    }

    if instant.is_empty() {
      return;
    }
    let count = instant.len();
    match self.notifier.send(&update.for_chats(instant)).await {
      Ok(()) => debug!(link_id = update.id, chats = count, transport = self.notifier.name(), "update sent"),
      Err(e) => warn!(link_id = update.id, transport = self.notifier.name(), error = %e, "update delivery failed"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::Utc;
  use linkwatch_cache::{Cache, MemoryCache};
  use linkwatch_core::chat::{DigestTime, NotificationMode};

  use super::*;
  use crate::testing::{FailingNotifier, RecordingNotifier, sample_update};

  const TTL: Duration = Duration::from_secs(60);

  fn chat(id: i64, mode: NotificationMode) -> Chat {
    Chat {
      chat_id:     id,
      mode,
      digest_time: (mode == NotificationMode::Digest).then(|| DigestTime::new(9, 0).unwrap()),
      created_at:  Utc::now(),
    }
  }

  #[tokio::test]
  async fn invalidates_every_subscriber_then_sends() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    for id in [1, 2] {
      cache.set(&LinkListCache::key(id), "[]".into(), TTL).await.unwrap();
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(notifier.clone(), LinkListCache::new(cache.clone(), TTL), None);

    let chats = [chat(1, NotificationMode::Instant), chat(2, NotificationMode::Digest)];
    dispatcher.dispatch(&sample_update(5, &[1, 2]), &chats).await;

    assert_eq!(cache.get(&LinkListCache::key(1)).await.unwrap(), None);
    assert_eq!(cache.get(&LinkListCache::key(2)).await.unwrap(), None);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tg_chat_ids, vec![1, 2]);
  }

  #[tokio::test]
  async fn digest_chats_are_buffered() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let digest = Arc::new(DigestBuffer::new(cache.clone(), TTL, 10));
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(
      notifier.clone(),
      LinkListCache::new(cache.clone(), TTL),
      Some(digest.clone()),
    );

    let chats = [chat(1, NotificationMode::Instant), chat(2, NotificationMode::Digest)];
    dispatcher.dispatch(&sample_update(5, &[1, 2]), &chats).await;

    assert_eq!(notifier.sent()[0].tg_chat_ids, vec![1]);
    assert_eq!(cache.keys("digest:updates:").await.unwrap(), vec!["digest:updates:2"]);

    let later = RecordingNotifier::default();
    assert_eq!(digest.flush(&later).await.unwrap(), 1);
    assert_eq!(later.sent()[0].tg_chat_ids, vec![2]);
  }

  #[tokio::test]
  async fn all_digest_chats_send_nothing_now() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(
      notifier.clone(),
      LinkListCache::new(cache.clone(), TTL),
      Some(Arc::new(DigestBuffer::new(cache, TTL, 10))),
    );
    dispatcher
      .dispatch(&sample_update(5, &[2]), &[chat(2, NotificationMode::Digest)])
      .await;
    assert!(notifier.sent().is_empty());
  }

  #[tokio::test]
  async fn delivery_failure_leaves_other_effects_in_place() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    for id in [1, 2] {
      cache.set(&LinkListCache::key(id), "[]".into(), TTL).await.unwrap();
    }
    let dispatcher = Dispatcher::new(
      Arc::new(FailingNotifier::new("down")),
      LinkListCache::new(cache.clone(), TTL),
      Some(Arc::new(DigestBuffer::new(cache.clone(), TTL, 10))),
    );

    let chats = [chat(1, NotificationMode::Instant), chat(2, NotificationMode::Digest)];
    dispatcher.dispatch(&sample_update(5, &[1, 2]), &chats).await;

    // The failed instant send neither restores the cached lists nor drops
    // the digest entry.
    assert_eq!(cache.get(&LinkListCache::key(1)).await.unwrap(), None);
    assert_eq!(cache.get(&LinkListCache::key(2)).await.unwrap(), None);
    assert_eq!(cache.range("digest:updates:2").await.unwrap().len(), 1);
    assert!(cache.range("digest:updates:1").await.unwrap().is_empty());
  }
}
