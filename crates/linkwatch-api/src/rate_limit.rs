//! Per-client token-bucket rate limiting.
//!
//! Each remote address owns a bucket of `requests` tokens refilled evenly
//! over `window`. An empty bucket answers 429 with `Retry-After`,
//! `X-RateLimit-Limit` and `X-RateLimit-Remaining` headers. Buckets idle for
//! longer than `idle` are purged by [`spawn_purger`].

use std::{
  collections::HashMap,
  net::SocketAddr,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::{Duration, Instant},
};

use axum::{
  Json,
  extract::{ConnectInfo, Request, State},
  http::{HeaderValue, StatusCode},
  middleware::Next,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
  pub requests: u32,
  pub window:   Duration,
  pub idle:     Duration,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      requests: 100,
      window:   Duration::from_secs(60),
      idle:     Duration::from_secs(3600),
    }
  }
}

impl RateLimitConfig {
  /// Seconds until one token is back: `ceil(window / requests)`.
  pub fn retry_after_secs(&self) -> u64 {
    let per_token = self.window.as_secs_f64() / f64::from(self.requests.max(1));
    (per_token.ceil() as u64).max(1)
  }
}

#[derive(Debug)]
struct Bucket {
  tokens:    f64,
  refilled:  Instant,
  last_seen: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
  config:  RateLimitConfig,
  buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
  pub fn new(config: RateLimitConfig) -> Self {
    Self { config, buckets: Mutex::default() }
  }

  pub fn config(&self) -> &RateLimitConfig { &self.config }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
    self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Take one token for `client`; `false` when the bucket is empty.
  pub fn try_acquire(&self, client: &str) -> bool {
    self.try_acquire_at(client, Instant::now())
  }

  fn try_acquire_at(&self, client: &str, now: Instant) -> bool {
    let capacity = f64::from(self.config.requests);
    let rate = capacity / self.config.window.as_secs_f64().max(f64::EPSILON);

    let mut buckets = self.lock();
    let bucket = buckets.entry(client.to_owned()).or_insert(Bucket {
      tokens:    capacity,
      refilled:  now,
      last_seen: now,
    });

    let elapsed = now.saturating_duration_since(bucket.refilled).as_secs_f64();
    bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
    bucket.refilled = now;
    bucket.last_seen = now;

    if bucket.tokens >= 1.0 {
      bucket.tokens -= 1.0;
      true
    } else {
      false
    }
  }

  /// Drop buckets not seen for `idle`; returns how many were dropped.
  pub fn purge_idle(&self) -> usize {
    self.purge_idle_at(Instant::now())
  }

  fn purge_idle_at(&self, now: Instant) -> usize {
    let mut buckets = self.lock();
    let before = buckets.len();
    buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) < self.config.idle);
    before - buckets.len()
  }

  pub fn tracked_clients(&self) -> usize { self.lock().len() }
}

/// Periodically purge idle buckets.
pub fn spawn_purger(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(limiter.config.idle.max(Duration::from_secs(1)));
    ticker.tick().await;
    loop {
      ticker.tick().await;
      let purged = limiter.purge_idle();
      if purged > 0 {
        debug!(purged, "purged idle rate-limit buckets");
      }
    }
  })
}

fn client_key(req: &Request) -> String {
  req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip().to_string())
    .unwrap_or_else(|| "unknown".to_owned())
}

/// axum middleware; mount with `middleware::from_fn_with_state`.
pub async fn limit(
  State(limiter): State<Arc<RateLimiter>>,
  req: Request,
  next: Next,
) -> Response {
  let client = client_key(&req);
  if limiter.try_acquire(&client) {
    return next.run(req).await;
  }

  debug!(client = %client, "rate limit exceeded");
  let config = limiter.config();
  let body = json!({
    "description":      "Too many requests",
    "code":             "429",
    "exceptionMessage": format!("rate limit of {} requests per {:?} exceeded", config.requests, config.window),
  });
  let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
  let headers = response.headers_mut();
  headers.insert("Retry-After", HeaderValue::from(config.retry_after_secs()));
  headers.insert("X-RateLimit-Limit", HeaderValue::from(config.requests));
  headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
  response
}

/// Wrap `router` with per-client rate limiting.
pub fn layer(router: axum::Router, limiter: Arc<RateLimiter>) -> axum::Router {
  router.layer(axum::middleware::from_fn_with_state(limiter, limit))
}
