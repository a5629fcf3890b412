//! [`ResilientClient`] — retrying, breaker-gated wrapper over `reqwest`.

use std::{sync::Arc, time::Duration};

use reqwest::{Request, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
  BreakerConfig, BreakerRegistry,
  error::{Error, Result},
};

/// Timeout, retry and breaker settings for outbound calls.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
  pub timeout:                Duration,
  /// Total attempts per call, including the first.
  pub retry_count:            u32,
  pub retry_backoff:          Duration,
  pub retryable_status_codes: Vec<u16>,
  pub breaker:                BreakerConfig,
}

impl Default for ResilienceConfig {
  fn default() -> Self {
    Self {
      timeout:                Duration::from_secs(10),
      retry_count:            3,
      retry_backoff:          Duration::from_millis(500),
      retryable_status_codes: vec![500, 502, 503, 504, 429],
      breaker:                BreakerConfig::default(),
    }
  }
}

impl ResilienceConfig {
  /// Delay before attempt `attempt + 1`: `backoff × min(2^(attempt-1), 8)`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(3);
    self.retry_backoff * factor
  }
}

/// Cheap to clone; clones share the connection pool and breaker registry.
#[derive(Clone)]
pub struct ResilientClient {
  http:     reqwest::Client,
  config:   Arc<ResilienceConfig>,
  breakers: Arc<BreakerRegistry>,
}

impl ResilientClient {
  pub fn new(config: ResilienceConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout)
      .user_agent(concat!("linkwatch/", env!("CARGO_PKG_VERSION")))
      .build()?;
    let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
    Ok(Self { http, config: Arc::new(config), breakers })
  }

  /// The underlying client, for building requests.
  pub fn http(&self) -> &reqwest::Client { &self.http }

  pub fn breakers(&self) -> &BreakerRegistry { &self.breakers }

  /// Send `request` on behalf of `service`.
  ///
  /// Responses whose status is not retryable are returned as-is, including
  /// 4xx. Retryable statuses and transport errors are retried up to
  /// `retry_count` attempts; each attempt first asks the service's breaker.
  pub async fn send(&self, service: &str, request: Request) -> Result<Response> {
    let breaker  = self.breakers.get(service);
    let attempts = self.config.retry_count.max(1);
    let mut attempt = 0;

    loop {
      attempt += 1;

      let current = request.try_clone().ok_or(Error::Unreplayable)?;
      // Dropped unsettled if this future is cancelled mid-call.
      let Some(permit) = breaker.try_acquire() else {
        warn!(service, url = %request.url(), "call rejected by open circuit breaker");
        return Err(Error::BreakerOpen(service.to_owned()));
      };

      match self.http.execute(current).await {
        Ok(response) => {
          let status = response.status();
          permit.record(!counts_as_failure(status));

          if !self.config.retryable_status_codes.contains(&status.as_u16()) {
            return Ok(response);
          }
          if attempt >= attempts {
            warn!(service, %status, attempts, "retries exhausted");
            return Err(Error::Upstream {
              service: service.to_owned(),
              status:  status.as_u16(),
            });
          }
          debug!(service, %status, attempt, "retryable status");
        }
        Err(e) => {
          permit.record(false);
          let err = if e.is_timeout() {
            Error::Timeout { service: service.to_owned() }
          } else {
            Error::Network(e)
          };
          if attempt >= attempts {
            warn!(service, error = %err, attempts, "retries exhausted");
            return Err(err);
          }
          debug!(service, error = %err, attempt, "transport error");
        }
      }

      tokio::time::sleep(self.config.backoff(attempt)).await;
    }
  }

  /// Send `request` and decode a successful JSON body.
  pub async fn get_json<T: DeserializeOwned>(
    &self,
    service: &str,
    request: Request,
  ) -> Result<T> {
    let response = self.send(service, request).await?;
    let response = ensure_success(service, response)?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
  }

  /// POST `body` as JSON to `url`; any non-2xx status is an error.
  pub async fn post_json<B: Serialize + ?Sized>(
    &self,
    service: &str,
    url: &str,
    body: &B,
  ) -> Result<()> {
    let request = self.http.post(url).json(body).build()?;
    let response = self.send(service, request).await?;
    ensure_success(service, response)?;
    Ok(())
  }
}

fn counts_as_failure(status: StatusCode) -> bool {
  status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn ensure_success(service: &str, response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    Ok(response)
  } else {
    Err(Error::Status { service: service.to_owned(), status: status.as_u16() })
  }
}
