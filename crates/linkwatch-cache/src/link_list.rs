//! Per-chat cache of subscribed links, keyed `tg-chat:links:{chat_id}`.
//!
//! The cache only ever holds a copy of what the link store returned; every
//! subscription change deletes the key so the next read repopulates it.

use std::{sync::Arc, time::Duration};

use linkwatch_core::link::Link;

use crate::{Cache, Result};

#[derive(Clone)]
pub struct LinkListCache {
  cache: Arc<dyn Cache>,
  ttl:   Duration,
}

impl LinkListCache {
  pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
    Self { cache, ttl }
  }

  pub fn key(chat_id: i64) -> String {
    format!("tg-chat:links:{chat_id}")
  }

  pub async fn get(&self, chat_id: i64) -> Result<Option<Vec<Link>>> {
    match self.cache.get(&Self::key(chat_id)).await? {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  pub async fn put(&self, chat_id: i64, links: &[Link]) -> Result<()> {
    let json = serde_json::to_string(links)?;
    self.cache.set(&Self::key(chat_id), json, self.ttl).await
  }

  pub async fn invalidate(&self, chat_id: i64) -> Result<()> {
    self.cache.delete(&Self::key(chat_id)).await
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use linkwatch_core::link::LinkType;

  use super::*;
  use crate::MemoryCache;

  fn link(id: i64) -> Link {
    Link {
      link_id:      id,
      url:          format!("https://github.com/o/r{id}"),
      link_type:    LinkType::GithubRepo,
      tags:         vec!["t".into()],
      filters:      vec![],
      last_checked: None,
      last_updated: Some(Utc::now()),
      created_at:   Utc::now(),
    }
  }

  #[tokio::test]
  async fn put_get_invalidate() {
    let cache = LinkListCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
    assert!(cache.get(5).await.unwrap().is_none());

    let links = vec![link(1), link(2)];
    cache.put(5, &links).await.unwrap();
    assert_eq!(cache.get(5).await.unwrap(), Some(links));
    assert!(cache.get(6).await.unwrap().is_none());

    cache.invalidate(5).await.unwrap();
    assert!(cache.get(5).await.unwrap().is_none());
  }

  #[test]
  fn key_layout() {
    assert_eq!(LinkListCache::key(-100), "tg-chat:links:-100");
  }
}
