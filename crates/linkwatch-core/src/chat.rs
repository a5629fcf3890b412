//! Chat — the subscriber side of the chat↔link relation.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// How a chat wants to receive update events.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NotificationMode {
  /// Each update is forwarded as soon as it is detected.
  #[default]
  Instant,
  /// Updates are buffered and delivered once per day.
  Digest,
}

/// A UTC wall-clock hour and minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestTime {
  pub hour:   u32,
  pub minute: u32,
}

impl DigestTime {
  pub fn new(hour: u32, minute: u32) -> Result<Self> {
    if hour > 23 || minute > 59 {
      return Err(Error::InvalidDigestTime { hour, minute });
    }
    Ok(Self { hour, minute })
  }

  pub fn as_naive_time(self) -> NaiveTime {
    NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
  }
}

/// A registered chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
  pub chat_id:     i64,
  pub mode:        NotificationMode,
  /// Required when `mode` is [`NotificationMode::Digest`].
  pub digest_time: Option<DigestTime>,
  pub created_at:  DateTime<Utc>,
}

impl Chat {
  pub fn wants_digest(&self) -> bool { self.mode == NotificationMode::Digest }
}

/// Input to [`crate::store::ChatStore::update_notification_settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
  pub mode:        NotificationMode,
  pub digest_time: Option<DigestTime>,
}

impl NotificationSettings {
  /// Build settings from the raw API fields, enforcing that digest mode
  /// carries a valid time. Instant mode discards any supplied time.
  pub fn new(
    mode: NotificationMode,
    hour: Option<u32>,
    minute: Option<u32>,
  ) -> Result<Self> {
    let digest_time = match (mode, hour) {
      (NotificationMode::Instant, _) => None,
      (NotificationMode::Digest, None) => return Err(Error::DigestTimeRequired),
      (NotificationMode::Digest, Some(h)) => {
        Some(DigestTime::new(h, minute.unwrap_or(0))?)
      }
    };
    Ok(Self { mode, digest_time })
  }
}
