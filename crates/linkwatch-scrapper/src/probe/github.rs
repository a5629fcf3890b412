use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkwatch_core::{
  link::{LinkTarget, LinkType},
  update::ContentDetails,
};
use linkwatch_http::ResilientClient;
use serde::Deserialize;

use super::Probe;
use crate::{Error, Result};

const SERVICE: &str = "github";

#[derive(Debug, Deserialize)]
struct Repo {
  pushed_at:  Option<DateTime<Utc>>,
  updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Issue {
  title:        String,
  user:         User,
  updated_at:   DateTime<Utc>,
  body:         Option<String>,
  pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct User {
  login: String,
}

/// Probe for `github.com/<owner>/<repo>` links via the REST API.
pub struct GithubProbe {
  client:  ResilientClient,
  api_url: String,
  token:   Option<String>,
}

impl GithubProbe {
  pub fn new(client: ResilientClient, api_url: impl Into<String>, token: Option<String>) -> Self {
    Self {
      client,
      api_url: api_url.into().trim_end_matches('/').to_owned(),
      token: token.filter(|t| !t.trim().is_empty()),
    }
  }

  fn repo_path(url: &str) -> Result<String> {
    match LinkTarget::parse(url)? {
      LinkTarget::GithubRepo { owner, repo } => Ok(format!("repos/{owner}/{repo}")),
      _ => Err(linkwatch_core::Error::InvalidUrl(url.to_owned()).into()),
    }
  }

  fn request(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Request> {
    let mut builder = self
      .client
      .http()
      .get(format!("{}/{path}", self.api_url))
      .query(query)
      .header(reqwest::header::ACCEPT, "application/vnd.github+json");
    if let Some(token) = &self.token {
      builder = builder.bearer_auth(token);
    }
    Ok(builder.build().map_err(linkwatch_http::Error::from)?)
  }
}

#[async_trait]
impl Probe for GithubProbe {
  fn link_type(&self) -> LinkType { LinkType::GithubRepo }

  async fn last_modified(&self, url: &str) -> Result<DateTime<Utc>> {
    let request = self.request(&Self::repo_path(url)?, &[])?;
    let repo: Repo = self.client.get_json(SERVICE, request).await?;
    Ok(repo.pushed_at.map_or(repo.updated_at, |p| p.max(repo.updated_at)))
  }

  async fn details(&self, url: &str) -> Result<ContentDetails> {
    let path = format!("{}/issues", Self::repo_path(url)?);
    let request = self.request(&path, &[
      ("state", "all"),
      ("sort", "updated"),
      ("direction", "desc"),
      ("per_page", "1"),
    ])?;
    let issues: Vec<Issue> = self.client.get_json(SERVICE, request).await?;
    let issue = issues
      .into_iter()
      .next()
      .ok_or_else(|| Error::from(linkwatch_core::Error::DetailsNotFound(url.to_owned())))?;

    let kind = if issue.pull_request.is_some() { "Pull request" } else { "Issue" };
    Ok(ContentDetails::new(
      LinkType::GithubRepo,
      format!("{kind}: {}", issue.title),
      issue.user.login,
      issue.updated_at,
      issue.body.unwrap_or_default(),
    ))
  }
}
