//! Upstream probes: per-provider last-modified and content-details lookups.

mod github;
mod stackoverflow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkwatch_core::{link::LinkType, update::ContentDetails};

pub use github::GithubProbe;
pub use stackoverflow::StackOverflowProbe;

use crate::Result;

/// Answers "when did this resource last change, and what changed?".
#[async_trait]
pub trait Probe: Send + Sync {
  /// The link variant this probe understands.
  fn link_type(&self) -> LinkType;

  /// Upstream last-modified time of the resource at `url`.
  async fn last_modified(&self, url: &str) -> Result<DateTime<Utc>>;

  /// The most recent piece of content at `url`.
  ///
  /// Fails with `DetailsNotFound` when the upstream has nothing to show.
  async fn details(&self, url: &str) -> Result<ContentDetails>;
}
