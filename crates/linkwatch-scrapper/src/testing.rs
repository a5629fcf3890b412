//! Shared fixtures for the crate's unit tests.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use linkwatch_core::{
  link::{LinkType, NewLink},
  update::{ContentDetails, LinkUpdate},
};
use linkwatch_http::{BreakerConfig, ResilienceConfig, ResilientClient};
use linkwatch_store_sqlite::SqliteStore;

use crate::{Error, Result, notifier::Notifier, probe::Probe};

/// Serve `app` on an ephemeral local port; returns its base URL.
pub async fn serve(app: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{addr}")
}

/// A client with fast retries and a breaker that never trips in tests.
pub fn resilient_client() -> ResilientClient {
  ResilientClient::new(ResilienceConfig {
    timeout: Duration::from_secs(5),
    retry_count: 2,
    retry_backoff: Duration::from_millis(1),
    breaker: BreakerConfig { min_calls: 1_000, ..BreakerConfig::default() },
    ..ResilienceConfig::default()
  })
  .unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn sample_update(id: i64, chats: &[i64]) -> LinkUpdate {
  LinkUpdate {
    id,
    url: format!("https://github.com/owner/repo{id}"),
    description: "New activity in GitHub repository".into(),
    tg_chat_ids: chats.to_vec(),
    update_info: None,
  }
}

/// In-memory store with `chats` registered and subscribed to `url`.
pub async fn store_with_link(url: &str, chats: &[i64]) -> (Arc<SqliteStore>, i64) {
  use linkwatch_core::store::{ChatStore, LinkStore};

  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let link = store
    .save_link(NewLink::parse(url, vec![], vec![]).unwrap())
    .await
    .unwrap();
  for &chat in chats {
    store.register_chat(chat).await.unwrap();
    store.add_chat_link(chat, link.link_id).await.unwrap();
  }
  (store, link.link_id)
}

// ─── Notifiers ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
  sent: Mutex<Vec<LinkUpdate>>,
}

impl RecordingNotifier {
  pub fn sent(&self) -> Vec<LinkUpdate> { self.sent.lock().unwrap().clone() }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  fn name(&self) -> &'static str { "recording" }

  async fn send(&self, update: &LinkUpdate) -> Result<()> {
    self.sent.lock().unwrap().push(update.clone());
    Ok(())
  }
}

pub struct FailingNotifier {
  message: &'static str,
}

impl FailingNotifier {
  pub fn new(message: &'static str) -> Self { Self { message } }
}

#[async_trait]
impl Notifier for FailingNotifier {
  fn name(&self) -> &'static str { "failing" }

  async fn send(&self, _update: &LinkUpdate) -> Result<()> {
    Err(Error::Upstream(self.message.to_owned()))
  }
}

// ─── Probe ───────────────────────────────────────────────────────────────────

/// Probe answering from a per-URL table of last-modified times.
///
/// URLs absent from the table fail; URLs containing `panic` panic.
pub struct FakeProbe {
  link_type: LinkType,
  times:     Mutex<HashMap<String, DateTime<Utc>>>,
  details:   Option<ContentDetails>,
  calls:     AtomicUsize,
}

impl FakeProbe {
  pub fn new(link_type: LinkType) -> Self {
    Self {
      link_type,
      times: Mutex::default(),
      details: None,
      calls: AtomicUsize::new(0),
    }
  }

  pub fn with_details(mut self, details: ContentDetails) -> Self {
    self.details = Some(details);
    self
  }

  pub fn set(&self, url: &str, at: DateTime<Utc>) {
    self.times.lock().unwrap().insert(url.to_owned(), at);
  }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn arc(self) -> Arc<Self> { Arc::new(self) }
}

#[async_trait]
impl Probe for FakeProbe {
  fn link_type(&self) -> LinkType { self.link_type }

  async fn last_modified(&self, url: &str) -> Result<DateTime<Utc>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if url.contains("panic") {
      panic!("probe exploded on {url}");
    }
    let found = self.times.lock().unwrap().get(url).copied();
    found.ok_or_else(|| Error::Upstream(format!("no such resource: {url}")))
  }

  async fn details(&self, url: &str) -> Result<ContentDetails> {
    self
      .details
      .clone()
      .ok_or_else(|| linkwatch_core::Error::DetailsNotFound(url.to_owned()).into())
  }
}
