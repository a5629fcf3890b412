//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so lexical order equals chronological order.
//! Enum discriminants are stored as their snake_case string form.

use chrono::{DateTime, SecondsFormat, Utc};
use linkwatch_core::{
  chat::{Chat, DigestTime, NotificationMode},
  link::{Link, LinkType},
  update::ContentDetails,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_link_type(t: LinkType) -> &'static str {
  match t {
    LinkType::GithubRepo => "github_repo",
    LinkType::StackoverflowQuestion => "stackoverflow_question",
    LinkType::Unknown => "unknown",
  }
}

pub fn decode_link_type(s: &str) -> Result<LinkType> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown link type: {s:?}")))
}

pub fn encode_mode(m: NotificationMode) -> &'static str {
  match m {
    NotificationMode::Instant => "instant",
    NotificationMode::Digest => "digest",
  }
}

pub fn decode_mode(s: &str) -> Result<NotificationMode> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown notification mode: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `links` row plus its tag and filter rows.
pub struct RawLink {
  pub link_id:      i64,
  pub url:          String,
  pub link_type:    String,
  pub last_checked: Option<String>,
  pub last_updated: Option<String>,
  pub created_at:   String,
  pub tags:         Vec<String>,
  pub filters:      Vec<String>,
}

impl RawLink {
  /// Columns must be selected in the order of [`crate::store::LINK_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      link_id:      row.get(0)?,
      url:          row.get(1)?,
      link_type:    row.get(2)?,
      last_checked: row.get(3)?,
      last_updated: row.get(4)?,
      created_at:   row.get(5)?,
      tags:         Vec::new(),
      filters:      Vec::new(),
    })
  }

  pub fn into_link(self) -> Result<Link> {
    Ok(Link {
      link_id:      self.link_id,
      url:          self.url,
      link_type:    decode_link_type(&self.link_type)?,
      tags:         self.tags,
      filters:      self.filters,
      last_checked: decode_opt_dt(self.last_checked)?,
      last_updated: decode_opt_dt(self.last_updated)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `chats` row.
pub struct RawChat {
  pub chat_id:       i64,
  pub mode:          String,
  pub digest_hour:   Option<u32>,
  pub digest_minute: Option<u32>,
  pub created_at:    String,
}

impl RawChat {
  /// Columns must be selected in the order of [`crate::store::CHAT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chat_id:       row.get(0)?,
      mode:          row.get(1)?,
      digest_hour:   row.get(2)?,
      digest_minute: row.get(3)?,
      created_at:    row.get(4)?,
    })
  }

  pub fn into_chat(self) -> Result<Chat> {
    let digest_time = match self.digest_hour {
      Some(h) => Some(DigestTime::new(h, self.digest_minute.unwrap_or(0))?),
      None => None,
    };
    Ok(Chat {
      chat_id: self.chat_id,
      mode: decode_mode(&self.mode)?,
      digest_time,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `content_details` row.
pub struct RawDetails {
  pub content_type: String,
  pub title:        String,
  pub author:       String,
  pub updated_at:   String,
  pub text_preview: String,
  pub full_text:    String,
}

impl RawDetails {
  pub fn into_details(self) -> Result<ContentDetails> {
    Ok(ContentDetails {
      title:        self.title,
      author:       self.author,
      updated_at:   decode_dt(&self.updated_at)?,
      content_type: decode_link_type(&self.content_type)?,
      text_preview: self.text_preview,
      full_text:    self.full_text,
    })
  }
}
