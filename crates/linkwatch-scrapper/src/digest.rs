//! Daily digest: buffers updates for digest-mode chats and delivers one
//! composite notification per chat at a fixed UTC time.
//!
//! Buffers live in the cache backend under `digest:updates:{chat_id}`, so
//! they survive restarts when the backend is Redis.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Days, Utc};
use linkwatch_cache::Cache;
use linkwatch_core::{chat::DigestTime, update::LinkUpdate};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{Result, Shutdown, notifier::Notifier};

const KEY_PREFIX: &str = "digest:updates:";

pub struct DigestBuffer {
  cache:       Arc<dyn Cache>,
  ttl:         Duration,
  max_entries: usize,
}

impl DigestBuffer {
  pub fn new(cache: Arc<dyn Cache>, ttl: Duration, max_entries: usize) -> Self {
    Self { cache, ttl, max_entries: max_entries.max(1) }
  }

  fn key(chat_id: i64) -> String { format!("{KEY_PREFIX}{chat_id}") }

  /// Buffer `update` for `chat_id`.
  pub async fn push(&self, chat_id: i64, update: &LinkUpdate) -> Result<()> {
    let entry = serde_json::to_string(&update.for_chats(vec![chat_id]))?;
    self.cache.append(&Self::key(chat_id), entry, self.ttl).await?;
    Ok(())
  }

  /// Deliver and clear every non-empty buffer. Returns the number of chats
  /// that received a digest.
  ///
  /// Entries are read in place and only trimmed once delivery succeeds, so a
  /// failed send or a crash mid-send leaves the buffer as it was. Entries
  /// pushed during the send wait for the next flush.
  pub async fn flush(&self, notifier: &dyn Notifier) -> Result<usize> {
    let mut delivered = 0;
    for key in self.cache.keys(KEY_PREFIX).await? {
      let Some(chat_id) = key.strip_prefix(KEY_PREFIX).and_then(|id| id.parse::<i64>().ok()) else {
        warn!(key = %key, "ignoring malformed digest key");
        continue;
      };

      let raw = self.cache.range(&key).await?;
      let updates: Vec<LinkUpdate> = raw
        .iter()
        .filter_map(|entry| match serde_json::from_str(entry) {
          Ok(update) => Some(update),
          Err(e) => {
            warn!(chat_id, error = %e, "dropping unreadable digest entry");
            None
          }
        })
        .collect();
      let Some(first) = updates.first() else {
        self.cache.trim_front(&key, raw.len()).await?;
        continue;
      };

      let digest = LinkUpdate {
        id:          first.id,
        url:         first.url.clone(),
        description: render(&updates, self.max_entries),
        tg_chat_ids: vec![chat_id],
        update_info: None,
      };

      match notifier.send(&digest).await {
        Ok(()) => {
          self.cache.trim_front(&key, raw.len()).await?;
          info!(chat_id, entries = updates.len(), "digest delivered");
          delivered += 1;
        }
        Err(e) => warn!(chat_id, error = %e, "digest delivery failed, keeping entries"),
      }
    }
    Ok(delivered)
  }
}

/// One line per update for the first `max` entries, then a count of the
/// rest.
pub fn render(updates: &[LinkUpdate], max: usize) -> String {
  let mut out = format!("Daily digest: {} update(s)", updates.len());
  for update in updates.iter().take(max) {
    out.push_str(&format!("\n• {} ({})", update.description, update.url));
  }
  if updates.len() > max {
    out.push_str(&format!("\n…and {} more", updates.len() - max));
  }
  out
}

/// The first `time` boundary strictly after `now`.
pub fn next_boundary(now: DateTime<Utc>, time: DigestTime) -> DateTime<Utc> {
  let today = now.date_naive().and_time(time.as_naive_time()).and_utc();
  if today > now {
    today
  } else {
    today.checked_add_days(Days::new(1)).unwrap_or(today)
  }
}

/// Flush `buffer` through `notifier` at every `time` boundary until
/// `shutdown` fires.
pub fn spawn(
  buffer: Arc<DigestBuffer>,
  notifier: Arc<dyn Notifier>,
  time: DigestTime,
  mut shutdown: Shutdown,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      let now = Utc::now();
      let next = next_boundary(now, time);
      let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
      info!(next = %next, "digest timer armed");

      tokio::select! {
        () = tokio::time::sleep(wait) => {}
        () = crate::cancelled(&mut shutdown) => break,
      }

      match buffer.flush(notifier.as_ref()).await {
        Ok(chats) => info!(chats, "digest flush complete"),
        Err(e) => warn!(error = %e, "digest flush failed"),
      }
    }
    info!("digest timer stopped");
  })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use linkwatch_cache::MemoryCache;

  use super::*;
  use crate::{
    Error,
    testing::{FailingNotifier, RecordingNotifier, sample_update},
  };

  fn buffer(max: usize) -> DigestBuffer {
    DigestBuffer::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600), max)
  }

  #[test]
  fn boundary_later_today() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
    let next = next_boundary(now, DigestTime::new(9, 0).unwrap());
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
  }

  #[test]
  fn boundary_rolls_to_tomorrow() {
    let now = Utc.with_ymd_and_hms(2024, 5, 31, 9, 0, 0).unwrap();
    let next = next_boundary(now, DigestTime::new(9, 0).unwrap());
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
  }

  #[test]
  fn render_truncates_with_remainder() {
    let updates: Vec<_> = (1..=5).map(|i| sample_update(i, &[1])).collect();
    let text = render(&updates, 2);
    assert!(text.starts_with("Daily digest: 5 update(s)"));
    assert!(text.contains("repo1"));
    assert!(text.contains("repo2"));
    assert!(!text.contains("repo3"));
    assert!(text.ends_with("…and 3 more"));
  }

  #[tokio::test]
  async fn flush_sends_one_digest_per_chat_in_order() {
    let digest = buffer(10);
    digest.push(1, &sample_update(10, &[1, 2])).await.unwrap();
    digest.push(2, &sample_update(10, &[1, 2])).await.unwrap();
    digest.push(1, &sample_update(11, &[1])).await.unwrap();

    let notifier = RecordingNotifier::default();
    assert_eq!(digest.flush(&notifier).await.unwrap(), 2);

    let mut sent = notifier.sent();
    sent.sort_by_key(|u| u.tg_chat_ids[0]);
    assert_eq!(sent[0].tg_chat_ids, vec![1]);
    assert_eq!(sent[0].id, 10);
    let first = sent[0].description.find("repo10").unwrap();
    let second = sent[0].description.find("repo11").unwrap();
    assert!(first < second);
    assert_eq!(sent[1].tg_chat_ids, vec![2]);

    assert_eq!(digest.flush(&notifier).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn failed_delivery_keeps_entries() {
    let digest = buffer(10);
    digest.push(1, &sample_update(10, &[1])).await.unwrap();

    assert_eq!(digest.flush(&FailingNotifier::new("down")).await.unwrap(), 0);

    let notifier = RecordingNotifier::default();
    assert_eq!(digest.flush(&notifier).await.unwrap(), 1);
    assert_eq!(notifier.sent()[0].id, 10);
  }

  /// Buffers one more update for chat 1 while its send is in flight, then
  /// fails the send.
  struct PushingThenFailing {
    buffer: Arc<DigestBuffer>,
  }

  #[async_trait::async_trait]
  impl Notifier for PushingThenFailing {
    fn name(&self) -> &'static str { "pushing-failing" }

    async fn send(&self, _update: &LinkUpdate) -> Result<()> {
      self.buffer.push(1, &sample_update(2, &[1])).await?;
      Err(Error::Upstream("bot down".into()))
    }
  }

  #[tokio::test]
  async fn failed_delivery_keeps_insertion_order() {
    let digest = Arc::new(buffer(10));
    digest.push(1, &sample_update(1, &[1])).await.unwrap();

    let failing = PushingThenFailing { buffer: digest.clone() };
    assert_eq!(digest.flush(&failing).await.unwrap(), 0);

    let notifier = RecordingNotifier::default();
    assert_eq!(digest.flush(&notifier).await.unwrap(), 1);
    let sent = notifier.sent();
    assert_eq!(sent[0].id, 1);
    let text = &sent[0].description;
    assert!(text.starts_with("Daily digest: 2 update(s)"));
    assert!(text.find("repo1").unwrap() < text.find("repo2").unwrap());
  }

  struct PushingThenSucceeding {
    buffer: Arc<DigestBuffer>,
    inner:  RecordingNotifier,
  }

  #[async_trait::async_trait]
  impl Notifier for PushingThenSucceeding {
    fn name(&self) -> &'static str { "pushing" }

    async fn send(&self, update: &LinkUpdate) -> Result<()> {
      self.buffer.push(1, &sample_update(2, &[1])).await?;
      self.inner.send(update).await
    }
  }

  #[tokio::test]
  async fn pushes_during_send_wait_for_next_flush() {
    let digest = Arc::new(buffer(10));
    digest.push(1, &sample_update(1, &[1])).await.unwrap();

    let notifier = PushingThenSucceeding {
      buffer: digest.clone(),
      inner:  RecordingNotifier::default(),
    };
    assert_eq!(digest.flush(&notifier).await.unwrap(), 1);
    assert_eq!(notifier.inner.sent()[0].id, 1);

    let next = RecordingNotifier::default();
    assert_eq!(digest.flush(&next).await.unwrap(), 1);
    assert_eq!(next.sent()[0].id, 2);
    assert!(next.sent()[0].description.starts_with("Daily digest: 1 update(s)"));
  }

  #[tokio::test]
  async fn timer_stops_on_shutdown() {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = spawn(
      Arc::new(buffer(10)),
      Arc::new(RecordingNotifier::default()),
      DigestTime::new(0, 0).unwrap(),
      rx,
    );
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
  }
}
