//! End-to-end: links enrolled through the API, swept by the scheduler,
//! updates observed at the notifier.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode},
};
use chrono::{DateTime, Utc};
use linkwatch_api::AppState;
use linkwatch_cache::{Cache, LinkListCache, MemoryCache};
use linkwatch_core::{link::LinkType, store::LinkStore, update::LinkUpdate};
use linkwatch_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt as _;

use crate::{
  Result,
  dispatch::Dispatcher,
  engine::Engine,
  factory::ProbeFactory,
  notifier::Notifier,
  scheduler::{Scheduler, SchedulerConfig},
  testing::{FakeProbe, RecordingNotifier},
};

const CHAT: i64 = 1001;
const URL: &str = "https://github.com/a/b";
const TTL: Duration = Duration::from_secs(60);

/// Records each update together with whether the sender's link list was
/// still cached at the moment it left.
struct CacheAwareNotifier {
  cache: Arc<dyn Cache>,
  inner: RecordingNotifier,
  cached_at_send: std::sync::Mutex<Vec<bool>>,
}

#[async_trait]
impl Notifier for CacheAwareNotifier {
  fn name(&self) -> &'static str { "cache-aware" }

  async fn send(&self, update: &LinkUpdate) -> Result<()> {
    let cached = self.cache.get(&LinkListCache::key(CHAT)).await?.is_some();
    self.cached_at_send.lock().unwrap().push(cached);
    self.inner.send(update).await
  }
}

struct Pipeline {
  api:       Router,
  store:     Arc<SqliteStore>,
  cache:     Arc<dyn Cache>,
  probe:     Arc<FakeProbe>,
  notifier:  Arc<CacheAwareNotifier>,
  scheduler: Scheduler<SqliteStore>,
}

async fn pipeline() -> Pipeline {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
  let links = LinkListCache::new(cache.clone(), TTL);
  let api = linkwatch_api::router(AppState::new(store.clone(), links.clone()));

  let probe = FakeProbe::new(LinkType::GithubRepo).arc();
  let notifier = Arc::new(CacheAwareNotifier {
    cache: cache.clone(),
    inner: RecordingNotifier::default(),
    cached_at_send: Default::default(),
  });
  let engine = Engine::new(
    store.clone(),
    ProbeFactory::new().register(probe.clone()),
    Dispatcher::new(notifier.clone(), links, None),
  );
  let scheduler = Scheduler::new(Arc::new(engine), SchedulerConfig {
    interval:   Duration::from_secs(60),
    batch_size: 10,
    workers:    2,
  });
  Pipeline { api, store, cache, probe, notifier, scheduler }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder()
    .method(method)
    .uri(uri)
    .header("Tg-Chat-Id", CHAT.to_string());
  let req = match body {
    Some(body) => builder
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, value)
}

fn ts(s: &str) -> DateTime<Utc> { s.parse().unwrap() }

#[tokio::test]
async fn enrolled_link_is_tracked_and_updates_flow() {
  let p = pipeline().await;
  let (_tx, shutdown) = watch::channel(false);

  let (status, _) = call(&p.api, "POST", &format!("/tg-chat/{CHAT}"), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, body) = call(
    &p.api,
    "POST",
    "/links",
    Some(json!({ "link": URL, "tags": ["t"], "filters": [] })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let link_id = body["id"].as_i64().unwrap();

  // First-ever tracking.
  p.probe.set(URL, ts("2024-01-01T00:00:00Z"));
  let report = p.scheduler.sweep(&shutdown).await.unwrap();
  assert_eq!(report.changed, 1);
  let sent = p.notifier.inner.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].tg_chat_ids, vec![CHAT]);
  assert!(sent[0].description.contains("GitHub"));
  let link = p.store.find_link(link_id).await.unwrap().unwrap();
  assert_eq!(link.last_updated, Some(ts("2024-01-01T00:00:00Z")));
  let first_check = link.last_checked.unwrap();

  // No-op sweep.
  tokio::time::sleep(Duration::from_millis(5)).await;
  p.scheduler.sweep(&shutdown).await.unwrap();
  assert_eq!(p.notifier.inner.sent().len(), 1);
  let link = p.store.find_link(link_id).await.unwrap().unwrap();
  assert!(link.last_checked.unwrap() > first_check);
  assert_eq!(link.last_updated, Some(ts("2024-01-01T00:00:00Z")));

  // Real update with a warm list cache.
  let (status, body) = call(&p.api, "GET", &format!("/links?tgChatId={CHAT}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["size"], 1);
  assert!(p.cache.get(&LinkListCache::key(CHAT)).await.unwrap().is_some());

  tokio::time::sleep(Duration::from_millis(5)).await;
  p.probe.set(URL, ts("2024-01-02T10:00:00Z"));
  p.scheduler.sweep(&shutdown).await.unwrap();
  let sent = p.notifier.inner.sent();
  assert_eq!(sent.len(), 2);
  assert_eq!(sent[1].tg_chat_ids, vec![CHAT]);
  assert_eq!(*p.notifier.cached_at_send.lock().unwrap(), vec![false, false]);
  let link = p.store.find_link(link_id).await.unwrap().unwrap();
  assert_eq!(link.last_updated, Some(ts("2024-01-02T10:00:00Z")));
}

#[tokio::test]
async fn unenrolled_orphan_is_no_longer_swept() {
  let p = pipeline().await;
  let (_tx, shutdown) = watch::channel(false);

  call(&p.api, "POST", &format!("/tg-chat/{CHAT}"), None).await;
  call(&p.api, "POST", "/links", Some(json!({ "link": URL, "tags": [], "filters": [] }))).await;
  let (status, _) = call(&p.api, "DELETE", "/links", Some(json!({ "link": URL }))).await;
  assert_eq!(status, StatusCode::OK);

  p.probe.set(URL, ts("2024-01-01T00:00:00Z"));
  let report = p.scheduler.sweep(&shutdown).await.unwrap();
  assert_eq!(report.processed, 0);
  assert_eq!(p.probe.calls(), 0);
}
