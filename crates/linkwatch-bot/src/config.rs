//! Runtime configuration for the bot binary.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use linkwatch_bus::Transport;
use linkwatch_core::duration;
use linkwatch_http::ResilienceSettings;
use serde::Deserialize;

use crate::consumer::ConsumerSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
  pub bot_port:         u16,
  pub telegram_token:   String,
  pub telegram_api_url: String,

  #[serde(flatten)]
  pub resilience: ResilienceSettings,

  pub message_transport:  Transport,
  pub message_fallback:   bool,
  pub bus_brokers:        PathBuf,
  pub topic_link_updates: String,
  pub topic_dlq:          String,
  pub consumer_group:     String,
  #[serde(deserialize_with = "duration::deserialize")]
  pub commit_interval:    Duration,
  #[serde(deserialize_with = "duration::deserialize")]
  pub poll_interval:      Duration,
  #[serde(deserialize_with = "duration::deserialize")]
  pub bus_write_timeout:  Duration,
}

impl Default for BotConfig {
  fn default() -> Self {
    Self {
      bot_port:           8090,
      telegram_token:     String::new(),
      telegram_api_url:   "https://api.telegram.org".into(),
      resilience:         ResilienceSettings::default(),
      message_transport:  Transport::Http,
      message_fallback:   false,
      bus_brokers:        "linkwatch-bus.db".into(),
      topic_link_updates: "link-updates".into(),
      topic_dlq:          "link-updates-dlq".into(),
      consumer_group:     "linkwatch-bot".into(),
      commit_interval:    Duration::from_secs(5),
      poll_interval:      Duration::from_millis(500),
      bus_write_timeout:  Duration::from_secs(5),
    }
  }
}

impl BotConfig {
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

  pub fn listen_addr(&self) -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], self.bot_port)) }

  /// Whether the scrapper may publish to the bus, so the consumer must run.
  pub fn consumes_bus(&self) -> bool {
    self.message_transport == Transport::Kafka || self.message_fallback
  }

  pub fn consumer(&self) -> ConsumerSettings {
    ConsumerSettings {
      dlq_topic:       self.topic_dlq.clone(),
      commit_interval: self.commit_interval,
      poll_interval:   self.poll_interval,
    }
  }
}
