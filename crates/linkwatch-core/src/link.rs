//! Link types — the tracked upstream resources.
//!
//! A link is identified by its URL. Its variant is derived from the URL on
//! ingress; links that match no supported provider are rejected and never
//! persisted.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── Variant ─────────────────────────────────────────────────────────────────

/// The upstream provider a link points at.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkType {
  GithubRepo,
  StackoverflowQuestion,
  /// Never persisted; rejected on ingress.
  Unknown,
}

impl LinkType {
  /// Human-readable provider name used in notification text.
  pub fn provider_name(self) -> &'static str {
    match self {
      Self::GithubRepo => "GitHub repository",
      Self::StackoverflowQuestion => "StackOverflow question",
      Self::Unknown => "link",
    }
  }
}

// ─── URL parsing ─────────────────────────────────────────────────────────────

static GITHUB_REPO: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^https?://(?:www\.)?github\.com/(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)(?:/.*)?$",
  )
  .expect("github pattern compiles")
});

static STACKOVERFLOW_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^https?://(?:www\.)?stackoverflow\.com/questions/(?P<id>[0-9]+)(?:/.*)?$",
  )
  .expect("stackoverflow pattern compiles")
});

static KNOWN_HOST: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^https?://(?:www\.)?(?:github\.com|stackoverflow\.com)(?:[/?#].*)?$")
    .expect("host pattern compiles")
});

static HTTP_URL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^https?://[^/\s?#]+(?:[/?#]\S*)?$").expect("url pattern compiles")
});

/// A URL resolved to the provider-specific coordinates a probe needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
  GithubRepo { owner: String, repo: String },
  StackoverflowQuestion { question_id: u64 },
}

impl LinkTarget {
  /// Parse `url` against every supported provider pattern.
  ///
  /// A URL on a known host that fails its provider pattern is
  /// [`Error::InvalidUrl`]; a well-formed URL on any other host is
  /// [`Error::UnsupportedLinkType`].
  pub fn parse(url: &str) -> Result<Self> {
    let url = url.trim();
    if let Some(caps) = GITHUB_REPO.captures(url) {
      return Ok(Self::GithubRepo {
        owner: caps["owner"].to_owned(),
        repo:  caps["repo"].trim_end_matches(".git").to_owned(),
      });
    }
    if let Some(caps) = STACKOVERFLOW_QUESTION.captures(url) {
      let question_id = caps["id"]
        .parse()
        .map_err(|_| Error::InvalidUrl(url.to_owned()))?;
      return Ok(Self::StackoverflowQuestion { question_id });
    }
    if KNOWN_HOST.is_match(url) || !HTTP_URL.is_match(url) {
      return Err(Error::InvalidUrl(url.to_owned()));
    }
    Err(Error::UnsupportedLinkType(url.to_owned()))
  }

  pub fn link_type(&self) -> LinkType {
    match self {
      Self::GithubRepo { .. } => LinkType::GithubRepo,
      Self::StackoverflowQuestion { .. } => LinkType::StackoverflowQuestion,
    }
  }
}

// ─── Link ────────────────────────────────────────────────────────────────────

/// A tracked URL together with its scan state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
  pub link_id:      i64,
  pub url:          String,
  pub link_type:    LinkType,
  /// Ordered, duplicate-free.
  pub tags:         Vec<String>,
  /// Ordered, duplicate-free.
  pub filters:      Vec<String>,
  /// Time of the most recent probe attempt; `None` means never probed.
  pub last_checked: Option<DateTime<Utc>>,
  /// Watermark of the last detected upstream change. Never moves backward.
  pub last_updated: Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
}

// ─── NewLink ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::LinkStore::save_link`].
#[derive(Debug, Clone)]
pub struct NewLink {
  pub url:       String,
  pub link_type: LinkType,
  pub tags:      Vec<String>,
  pub filters:   Vec<String>,
}

impl NewLink {
  /// Validate `url` and build a link with de-duplicated tags and filters.
  pub fn parse(
    url: &str,
    tags: Vec<String>,
    filters: Vec<String>,
  ) -> Result<Self> {
    let target = LinkTarget::parse(url)?;
    Ok(Self {
      url: url.trim().to_owned(),
      link_type: target.link_type(),
      tags: dedup_ordered(tags),
      filters: dedup_ordered(filters),
    })
  }
}

/// Drop blank entries and later duplicates, keeping first-seen order.
pub fn dedup_ordered(values: Vec<String>) -> Vec<String> {
  let mut out: Vec<String> = Vec::with_capacity(values.len());
  for v in values {
    let v = v.trim().to_owned();
    if !v.is_empty() && !out.contains(&v) {
      out.push(v);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_github_repo() {
    let t = LinkTarget::parse("https://github.com/rust-lang/rust").unwrap();
    assert_eq!(t, LinkTarget::GithubRepo {
      owner: "rust-lang".into(),
      repo:  "rust".into(),
    });
    assert_eq!(t.link_type(), LinkType::GithubRepo);
  }

  #[test]
  fn parses_github_repo_with_www_and_subpath() {
    let t =
      LinkTarget::parse("http://www.github.com/a/b/tree/main/src").unwrap();
    assert_eq!(t, LinkTarget::GithubRepo {
      owner: "a".into(),
      repo:  "b".into(),
    });
  }

  #[test]
  fn parses_stackoverflow_question() {
    let t = LinkTarget::parse(
      "https://stackoverflow.com/questions/1642028/what-is-the-operator",
    )
    .unwrap();
    assert_eq!(t, LinkTarget::StackoverflowQuestion { question_id: 1642028 });
  }

  #[test]
  fn malformed_known_host_is_invalid_url() {
    let err = LinkTarget::parse("https://github.com/only-owner").unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));

    let err =
      LinkTarget::parse("https://stackoverflow.com/questions/abc").unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));
  }

  #[test]
  fn garbage_is_invalid_url() {
    let err = LinkTarget::parse("not a url").unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));
  }

  #[test]
  fn other_host_is_unsupported() {
    let err = LinkTarget::parse("https://example.com/feed").unwrap_err();
    assert!(matches!(err, Error::UnsupportedLinkType(_)));
  }

  #[test]
  fn new_link_dedups_tags_and_filters() {
    let link = NewLink::parse(
      " https://github.com/a/b ",
      vec!["work".into(), "rust".into(), "work".into(), " ".into()],
      vec!["user=bot".into(), "user=bot".into()],
    )
    .unwrap();
    assert_eq!(link.url, "https://github.com/a/b");
    assert_eq!(link.tags, vec!["work", "rust"]);
    assert_eq!(link.filters, vec!["user=bot"]);
  }

  #[test]
  fn link_type_string_forms() {
    assert_eq!(LinkType::GithubRepo.as_ref(), "github_repo");
    assert_eq!(
      "stackoverflow_question".parse::<LinkType>().unwrap(),
      LinkType::StackoverflowQuestion
    );
  }
}
