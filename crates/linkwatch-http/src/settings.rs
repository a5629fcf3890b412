//! Flat, environment-friendly form of [`ResilienceConfig`].
//!
//! Binaries `#[serde(flatten)]` this into their own settings so the keys
//! `EXTERNAL_REQUEST_TIMEOUT`, `RETRY_*` and `CB_*` read the same everywhere.

use std::{fmt, time::Duration};

use linkwatch_core::duration;
use serde::{Deserialize, Deserializer, de};

use crate::{BreakerConfig, ResilienceConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
  #[serde(deserialize_with = "duration::deserialize")]
  pub external_request_timeout: Duration,
  pub retry_count:              u32,
  #[serde(deserialize_with = "duration::deserialize")]
  pub retry_backoff:            Duration,
  #[serde(deserialize_with = "status_codes")]
  pub retryable_status_codes:   Vec<u16>,
  #[serde(deserialize_with = "duration::deserialize")]
  pub cb_sliding_window:        Duration,
  pub cb_min_calls:             usize,
  pub cb_fail_rate_percent:     u8,
  pub cb_half_open_calls:       usize,
  #[serde(deserialize_with = "duration::deserialize")]
  pub cb_open_state_duration:   Duration,
}

impl Default for ResilienceSettings {
  fn default() -> Self {
    let client = ResilienceConfig::default();
    let breaker = client.breaker;
    Self {
      external_request_timeout: client.timeout,
      retry_count:              client.retry_count,
      retry_backoff:            client.retry_backoff,
      retryable_status_codes:   client.retryable_status_codes,
      cb_sliding_window:        breaker.sliding_window,
      cb_min_calls:             breaker.min_calls,
      cb_fail_rate_percent:     breaker.fail_rate_percent,
      cb_half_open_calls:       breaker.half_open_calls,
      cb_open_state_duration:   breaker.open_state_duration,
    }
  }
}

impl From<&ResilienceSettings> for ResilienceConfig {
  fn from(s: &ResilienceSettings) -> Self {
    Self {
      timeout:                s.external_request_timeout,
      retry_count:            s.retry_count,
      retry_backoff:          s.retry_backoff,
      retryable_status_codes: s.retryable_status_codes.clone(),
      breaker:                BreakerConfig {
        sliding_window:      s.cb_sliding_window,
        min_calls:           s.cb_min_calls,
        fail_rate_percent:   s.cb_fail_rate_percent.min(100),
        half_open_calls:     s.cb_half_open_calls,
        open_state_duration: s.cb_open_state_duration,
      },
    }
  }
}

/// Accepts `[500, "502"]`, `"500,502"` or a single number.
fn status_codes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u16>, D::Error> {
  deserializer.deserialize_any(StatusCodes)
}

struct StatusCodes;

fn code<E: de::Error>(raw: &str) -> Result<u16, E> {
  raw.trim().parse().map_err(|_| E::custom(format!("invalid status code {raw:?}")))
}

impl<'de> de::Visitor<'de> for StatusCodes {
  type Value = Vec<u16>;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a list of HTTP status codes")
  }

  fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
    u16::try_from(v).map(|c| vec![c]).map_err(E::custom)
  }

  fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
    u16::try_from(v).map(|c| vec![c]).map_err(E::custom)
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
    v.split(',').filter(|s| !s.trim().is_empty()).map(code).collect()
  }

  fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Item {
      Number(u16),
      Text(String),
    }

    let mut codes = Vec::new();
    while let Some(item) = seq.next_element::<Item>()? {
      codes.push(match item {
        Item::Number(n) => n,
        Item::Text(s) => code(&s)?,
      });
    }
    Ok(codes)
  }
}
