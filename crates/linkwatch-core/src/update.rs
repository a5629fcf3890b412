//! Update events and the content details attached to them.
//!
//! [`LinkUpdate`] is the wire shape shared by the HTTP `/updates` endpoint
//! and the `link-updates` bus topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::link::LinkType;

/// Maximum number of characters kept in [`ContentDetails::text_preview`],
/// ellipsis included.
pub const PREVIEW_LIMIT: usize = 200;

const ELLIPSIS: &str = "...";

/// Truncate `text` to at most [`PREVIEW_LIMIT`] characters, ending with an
/// ellipsis when anything was cut.
pub fn preview(text: &str) -> String {
  let text = text.trim();
  if text.chars().count() <= PREVIEW_LIMIT {
    return text.to_owned();
  }
  let keep = PREVIEW_LIMIT - ELLIPSIS.len();
  let mut out: String = text.chars().take(keep).collect();
  out.push_str(ELLIPSIS);
  out
}

/// The most recent upstream content for a link, as reported by its probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDetails {
  pub title:        String,
  pub author:       String,
  pub updated_at:   DateTime<Utc>,
  pub content_type: LinkType,
  pub text_preview: String,
  pub full_text:    String,
}

impl ContentDetails {
  /// Build details, deriving the preview from `full_text`.
  pub fn new(
    content_type: LinkType,
    title: impl Into<String>,
    author: impl Into<String>,
    updated_at: DateTime<Utc>,
    full_text: impl Into<String>,
  ) -> Self {
    let full_text = full_text.into();
    Self {
      title: title.into(),
      author: author.into(),
      updated_at,
      content_type,
      text_preview: preview(&full_text),
      full_text,
    }
  }
}

/// An in-flight update event addressed to a set of chats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUpdate {
  pub id:          i64,
  pub url:         String,
  pub description: String,
  pub tg_chat_ids: Vec<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub update_info: Option<ContentDetails>,
}

impl LinkUpdate {
  /// The first schema violation in this update, if any.
  pub fn validate(&self) -> Result<(), &'static str> {
    if self.url.trim().is_empty() {
      return Err("missing URL in update");
    }
    if self.description.trim().is_empty() {
      return Err("missing description in update");
    }
    Ok(())
  }

  /// A copy of this update addressed to `chat_ids` only.
  pub fn for_chats(&self, chat_ids: Vec<i64>) -> Self {
    Self { tg_chat_ids: chat_ids, ..self.clone() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_preview_is_untouched() {
    assert_eq!(preview("  hello  "), "hello");
  }

  #[test]
  fn long_preview_is_truncated_with_ellipsis() {
    let text = "é".repeat(250);
    let p = preview(&text);
    assert_eq!(p.chars().count(), PREVIEW_LIMIT);
    assert!(p.ends_with("..."));
  }

  #[test]
  fn update_serialises_camel_case() {
    let update = LinkUpdate {
      id:          7,
      url:         "https://github.com/a/b".into(),
      description: "GitHub repository updated".into(),
      tg_chat_ids: vec![1001],
      update_info: None,
    };
    let json = serde_json::to_value(&update).unwrap();
    assert_eq!(json["tgChatIds"][0], 1001);
    assert!(json.get("updateInfo").is_none());
  }

  #[test]
  fn validate_reports_missing_fields() {
    let mut update = LinkUpdate {
      id:          1,
      url:         String::new(),
      description: "x".into(),
      tg_chat_ids: vec![],
      update_info: None,
    };
    assert_eq!(update.validate(), Err("missing URL in update"));
    update.url = "https://github.com/a/b".into();
    update.description = " ".into();
    assert_eq!(update.validate(), Err("missing description in update"));
  }
}
