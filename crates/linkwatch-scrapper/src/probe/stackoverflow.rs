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

const SERVICE: &str = "stackoverflow";
const SITE: &str = "stackoverflow";

/// StackExchange wraps every result set in `{"items": [...]}`.
#[derive(Debug, Deserialize)]
struct Page<T> {
  items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Question {
  title:              String,
  last_activity_date: i64,
  owner:              Option<Owner>,
  body:               Option<String>,
}

#[derive(Debug, Deserialize)]
struct Answer {
  last_activity_date: i64,
  owner:              Option<Owner>,
  body:               Option<String>,
}

#[derive(Debug, Deserialize)]
struct Owner {
  display_name: Option<String>,
}

impl Owner {
  fn name(owner: Option<Owner>) -> String {
    owner
      .and_then(|o| o.display_name)
      .unwrap_or_else(|| "anonymous".to_owned())
  }
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp(secs, 0)
    .ok_or_else(|| Error::Upstream(format!("activity date {secs} out of range")))
}

/// Probe for `stackoverflow.com/questions/<id>` links via the StackExchange
/// API.
pub struct StackOverflowProbe {
  client:  ResilientClient,
  api_url: String,
}

impl StackOverflowProbe {
  pub fn new(client: ResilientClient, api_url: impl Into<String>) -> Self {
    Self { client, api_url: api_url.into().trim_end_matches('/').to_owned() }
  }

  fn question_id(url: &str) -> Result<u64> {
    match LinkTarget::parse(url)? {
      LinkTarget::StackoverflowQuestion { question_id } => Ok(question_id),
      _ => Err(linkwatch_core::Error::InvalidUrl(url.to_owned()).into()),
    }
  }

  async fn fetch<T: serde::de::DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, &str)],
  ) -> Result<Vec<T>> {
    let request = self
      .client
      .http()
      .get(format!("{}/2.3/{path}", self.api_url))
      .query(&[("site", SITE)])
      .query(query)
      .build()
      .map_err(linkwatch_http::Error::from)?;
    let page: Page<T> = self.client.get_json(SERVICE, request).await?;
    Ok(page.items)
  }

  async fn question(&self, url: &str, with_body: bool) -> Result<Question> {
    let id = Self::question_id(url)?;
    let query: &[(&str, &str)] = if with_body { &[("filter", "withbody")] } else { &[] };
    self
      .fetch::<Question>(&format!("questions/{id}"), query)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| Error::Upstream(format!("question {id} does not exist")))
  }
}

#[async_trait]
impl Probe for StackOverflowProbe {
  fn link_type(&self) -> LinkType { LinkType::StackoverflowQuestion }

  async fn last_modified(&self, url: &str) -> Result<DateTime<Utc>> {
    from_epoch(self.question(url, false).await?.last_activity_date)
  }

  async fn details(&self, url: &str) -> Result<ContentDetails> {
    let id = Self::question_id(url)?;
    let question = self.question(url, true).await.map_err(|e| match e {
      Error::Upstream(_) => linkwatch_core::Error::DetailsNotFound(url.to_owned()).into(),
      other => other,
    })?;

    let answers: Vec<Answer> = self
      .fetch(&format!("questions/{id}/answers"), &[
        ("order", "desc"),
        ("sort", "activity"),
        ("filter", "withbody"),
        ("pagesize", "1"),
      ])
      .await?;

    let (author, at, body) = match answers.into_iter().next() {
      Some(answer) => (Owner::name(answer.owner), answer.last_activity_date, answer.body),
      None => (Owner::name(question.owner), question.last_activity_date, question.body),
    };

    Ok(ContentDetails::new(
      LinkType::StackoverflowQuestion,
      question.title,
      author,
      from_epoch(at)?,
      body.unwrap_or_default(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use axum::{Json, Router, extract::Query, routing::get};
  use serde_json::{Value, json};
  use std::collections::HashMap;

  use super::*;
  use crate::testing::{resilient_client, serve};

  async fn question(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(q.get("site").map(String::as_str), Some("stackoverflow"));
    Json(json!({ "items": [{
      "title": "How do lifetimes work?",
      "last_activity_date": 1_700_000_000,
      "owner": { "display_name": "asker" },
      "body": "<p>question body</p>",
    }]}))
  }

  async fn answers() -> Json<Value> {
    Json(json!({ "items": [{
      "last_activity_date": 1_700_000_500,
      "owner": { "display_name": "answerer" },
      "body": "<p>answer body</p>",
    }]}))
  }

  async fn server() -> String {
    serve(
      Router::new()
        .route("/2.3/questions/1", get(question))
        .route("/2.3/questions/1/answers", get(answers))
        .route("/2.3/questions/2", get(question))
        .route("/2.3/questions/2/answers", get(|| async { Json(json!({ "items": [] })) }))
        .route("/2.3/questions/3", get(|| async { Json(json!({ "items": [] })) })),
    )
    .await
  }

  #[tokio::test]
  async fn last_modified_is_last_activity() {
    let probe = StackOverflowProbe::new(resilient_client(), server().await);
    let at = probe
      .last_modified("https://stackoverflow.com/questions/1/how-do-lifetimes-work")
      .await
      .unwrap();
    assert_eq!(at.timestamp(), 1_700_000_000);
  }

  #[tokio::test]
  async fn details_prefer_latest_answer() {
    let probe = StackOverflowProbe::new(resilient_client(), server().await);
    let details = probe.details("https://stackoverflow.com/questions/1").await.unwrap();
    assert_eq!(details.title, "How do lifetimes work?");
    assert_eq!(details.author, "answerer");
    assert_eq!(details.updated_at.timestamp(), 1_700_000_500);
    assert_eq!(details.full_text, "<p>answer body</p>");
  }

  #[tokio::test]
  async fn details_fall_back_to_question_body() {
    let probe = StackOverflowProbe::new(resilient_client(), server().await);
    let details = probe.details("https://stackoverflow.com/questions/2").await.unwrap();
    assert_eq!(details.author, "asker");
    assert_eq!(details.full_text, "<p>question body</p>");
  }

  #[tokio::test]
  async fn missing_question() {
    let probe = StackOverflowProbe::new(resilient_client(), server().await);
    let url = "https://stackoverflow.com/questions/3";
    assert!(matches!(probe.last_modified(url).await, Err(Error::Upstream(_))));
    assert!(matches!(
      probe.details(url).await,
      Err(Error::Core(linkwatch_core::Error::DetailsNotFound(_)))
    ));
  }
}
