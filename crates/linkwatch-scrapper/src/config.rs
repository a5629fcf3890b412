//! Runtime configuration for the scrapper binary.
//!
//! Values come from an optional TOML file layered under the process
//! environment. Environment keys are the upper-case field names
//! (`SCHEDULER_INTERVAL=30s`, `MESSAGE_TRANSPORT=KAFKA`, ...).

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use linkwatch_api::rate_limit::RateLimitConfig;
pub use linkwatch_bus::Transport;
use linkwatch_core::{chat::DigestTime, duration};
use linkwatch_http::ResilienceSettings;
use serde::Deserialize;

use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapperConfig {
  pub scrapper_port: u16,
  pub bot_url:       String,
  pub database_path: PathBuf,

  #[serde(deserialize_with = "duration::deserialize")]
  pub scheduler_interval: Duration,
  pub batch_size:         usize,
  pub workers:            usize,

  #[serde(flatten)]
  pub resilience: ResilienceSettings,

  pub message_transport:  Transport,
  pub message_fallback:   bool,
  pub bus_brokers:        PathBuf,
  pub topic_link_updates: String,
  #[serde(deserialize_with = "duration::deserialize")]
  pub bus_write_timeout:  Duration,

  pub cache_url: String,
  #[serde(deserialize_with = "duration::deserialize")]
  pub cache_ttl: Duration,

  pub digest_enabled:     bool,
  pub digest_hour:        u32,
  pub digest_minute:      u32,
  pub digest_max_entries: usize,
  #[serde(deserialize_with = "duration::deserialize")]
  pub digest_ttl:         Duration,

  pub rate_limit_requests: u32,
  #[serde(deserialize_with = "duration::deserialize")]
  pub rate_limit_window:   Duration,
  #[serde(deserialize_with = "duration::deserialize")]
  pub rate_limit_idle:     Duration,

  pub github_token:          Option<String>,
  pub github_api_url:        String,
  pub stackoverflow_api_url: String,
}

impl Default for ScrapperConfig {
  fn default() -> Self {
    let scheduler = SchedulerConfig::default();
    let rate_limit = RateLimitConfig::default();
    Self {
      scrapper_port:         8080,
      bot_url:               "http://localhost:8090".into(),
      database_path:         "linkwatch.db".into(),
      scheduler_interval:    scheduler.interval,
      batch_size:            scheduler.batch_size,
      workers:               scheduler.workers,
      resilience:            ResilienceSettings::default(),
      message_transport:     Transport::Http,
      message_fallback:      false,
      bus_brokers:           "linkwatch-bus.db".into(),
      topic_link_updates:    "link-updates".into(),
      bus_write_timeout:     Duration::from_secs(5),
      cache_url:             "memory".into(),
      cache_ttl:             Duration::from_secs(600),
      digest_enabled:        true,
      digest_hour:           10,
      digest_minute:         0,
      digest_max_entries:    20,
      digest_ttl:            Duration::from_secs(2 * 86_400),
      rate_limit_requests:   rate_limit.requests,
      rate_limit_window:     rate_limit.window,
      rate_limit_idle:       rate_limit.idle,
      github_token:          None,
      github_api_url:        "https://api.github.com".into(),
      stackoverflow_api_url: "https://api.stackexchange.com".into(),
    }
  }
}

impl ScrapperConfig {
  /// Layer the environment over `file` (when it exists) and deserialise.
  pub fn load(file: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    builder
      .add_source(
        config::Environment::default()
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("retryable_status_codes"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn listen_addr(&self) -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], self.scrapper_port)) }

  pub fn scheduler(&self) -> SchedulerConfig {
    SchedulerConfig {
      interval:   self.scheduler_interval,
      batch_size: self.batch_size,
      workers:    self.workers,
    }
  }

  pub fn rate_limit(&self) -> RateLimitConfig {
    RateLimitConfig {
      requests: self.rate_limit_requests,
      window:   self.rate_limit_window,
      idle:     self.rate_limit_idle,
    }
  }

  pub fn digest_time(&self) -> linkwatch_core::Result<DigestTime> {
    DigestTime::new(self.digest_hour, self.digest_minute)
  }
}
