//! Handlers for `/links` and `/links/tags`.
//!
//! | Method   | Path          | Notes |
//! |----------|---------------|-------|
//! | `GET`    | `/links`      | `?tgChatId=<id>[&tag=<tag>]`; served from the list cache |
//! | `POST`   | `/links`      | Header `Tg-Chat-Id`; body [`AddLinkBody`]; 409 if already tracked by the chat |
//! | `DELETE` | `/links`      | Header `Tg-Chat-Id`; body [`LinkBody`] |
//! | `POST`   | `/links/tags` | Header `Tg-Chat-Id`; body [`TagBody`]; 409 if tagged |
//! | `DELETE` | `/links/tags` | Header `Tg-Chat-Id`; body [`TagBody`] |

use axum::{Json, extract::State};
use linkwatch_cache::LinkListCache;
use linkwatch_core::{
  link::{Link, NewLink},
  store::StoreError as _,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  ApiStore, AppState,
  error::ApiError,
  extract::{ApiJson, ApiQuery, ChatId},
};

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResponse {
  pub id:      i64,
  pub url:     String,
  pub tags:    Vec<String>,
  pub filters: Vec<String>,
}

impl From<Link> for LinkResponse {
  fn from(link: Link) -> Self {
    Self { id: link.link_id, url: link.url, tags: link.tags, filters: link.filters }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListLinksResponse {
  pub links: Vec<LinkResponse>,
  pub size:  usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub tg_chat_id: i64,
  pub tag:        Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLinkBody {
  pub link:    String,
  #[serde(default)]
  pub tags:    Vec<String>,
  #[serde(default)]
  pub filters: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkBody {
  pub link: String,
}

#[derive(Debug, Deserialize)]
pub struct TagBody {
  pub link: String,
  pub tag:  String,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Drop the chat's cached link list. Failures are logged, never returned.
pub async fn invalidate(cache: &LinkListCache, chat_id: i64) {
  if let Err(e) = cache.invalidate(chat_id).await {
    warn!(chat_id, error = %e, "failed to invalidate link list cache");
  }
}

async fn require_chat<S: ApiStore>(store: &S, chat_id: i64) -> Result<(), ApiError> {
  match store.find_chat(chat_id).await.map_err(ApiError::from_store)? {
    Some(_) => Ok(()),
    None => Err(linkwatch_core::Error::ChatNotFound(chat_id).into()),
  }
}

/// The chat's links, read through the list cache.
async fn links_for_chat<S: ApiStore>(
  state: &AppState<S>,
  chat_id: i64,
) -> Result<Vec<Link>, ApiError> {
  match state.links.get(chat_id).await {
    Ok(Some(links)) => return Ok(links),
    Ok(None) => {}
    Err(e) => warn!(chat_id, error = %e, "link list cache read failed"),
  }

  let links = state
    .store
    .find_links_by_chat(chat_id)
    .await
    .map_err(ApiError::from_store)?;

  if let Err(e) = state.links.put(chat_id, &links).await {
    warn!(chat_id, error = %e, "link list cache write failed");
  }
  Ok(links)
}

/// The link at `url`, provided `chat_id` subscribes to it.
async fn subscribed_link<S: ApiStore>(
  store: &S,
  chat_id: i64,
  url: &str,
) -> Result<Link, ApiError> {
  let url = url.trim();
  let link = store
    .find_link_by_url(url.to_owned())
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| linkwatch_core::Error::LinkNotFound(url.to_owned()))?;
  let subscribed = store
    .chat_link_exists(chat_id, link.link_id)
    .await
    .map_err(ApiError::from_store)?;
  if !subscribed {
    return Err(linkwatch_core::Error::LinkNotFound(url.to_owned()).into());
  }
  Ok(link)
}

/// Tags are shared by every subscriber, so all their lists go stale.
async fn invalidate_subscribers<S: ApiStore>(
  state: &AppState<S>,
  link_id: i64,
) -> Result<(), ApiError> {
  let chats = state
    .store
    .find_chats_by_link(link_id)
    .await
    .map_err(ApiError::from_store)?;
  for chat in chats {
    invalidate(&state.links, chat.chat_id).await;
  }
  Ok(())
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /links?tgChatId=<id>[&tag=<tag>]`
pub async fn list<S: ApiStore>(
  State(state): State<AppState<S>>,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<ListLinksResponse>, ApiError> {
  require_chat(&*state.store, params.tg_chat_id).await?;
  let mut links = links_for_chat(&state, params.tg_chat_id).await?;

  if let Some(tag) = params.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
    links.retain(|l| l.tags.iter().any(|t| t == tag));
  }

  let links: Vec<LinkResponse> = links.into_iter().map(LinkResponse::from).collect();
  Ok(Json(ListLinksResponse { size: links.len(), links }))
}

// ─── Enroll ──────────────────────────────────────────────────────────────────

/// `POST /links`
///
/// Joining a link another chat already tracks replaces its tags and filters
/// with the ones in the request.
pub async fn enroll<S: ApiStore>(
  State(state): State<AppState<S>>,
  ChatId(chat_id): ChatId,
  ApiJson(body): ApiJson<AddLinkBody>,
) -> Result<Json<LinkResponse>, ApiError> {
  require_chat(&*state.store, chat_id).await?;
  let new = NewLink::parse(&body.link, body.tags, body.filters)?;
  let url = new.url.clone();

  let existing = state
    .store
    .find_link_by_url(url.clone())
    .await
    .map_err(ApiError::from_store)?;

  let link = match existing {
    Some(link) => {
      let subscribed = state
        .store
        .chat_link_exists(chat_id, link.link_id)
        .await
        .map_err(ApiError::from_store)?;
      if subscribed {
        return Err(linkwatch_core::Error::LinkAlreadyExists(url).into());
      }
      return join(&state, chat_id, link, new).await;
    }
    None => match state.store.save_link(new.clone()).await {
      Ok(link) => link,
      // Another chat enrolled the same URL concurrently.
      Err(e) if matches!(e.domain(), Some(linkwatch_core::Error::LinkAlreadyExists(_))) => {
        let link = state
          .store
          .find_link_by_url(url.clone())
          .await
          .map_err(ApiError::from_store)?
          .ok_or_else(|| linkwatch_core::Error::LinkNotFound(url.clone()))?;
        return join(&state, chat_id, link, new).await;
      }
      Err(e) => return Err(ApiError::from_store(e)),
    },
  };

  state
    .store
    .add_chat_link(chat_id, link.link_id)
    .await
    .map_err(ApiError::from_store)?;
  invalidate(&state.links, chat_id).await;

  info!(chat_id, link_id = link.link_id, url = %link.url, "link enrolled");
  Ok(Json(link.into()))
}

/// Subscribe `chat_id` to a link that already exists and apply the
/// request's tag and filter sets.
async fn join<S: ApiStore>(
  state: &AppState<S>,
  chat_id: i64,
  link: Link,
  new: NewLink,
) -> Result<Json<LinkResponse>, ApiError> {
  state
    .store
    .add_chat_link(chat_id, link.link_id)
    .await
    .map_err(ApiError::from_store)?;
  state
    .store
    .save_tags(link.link_id, new.tags)
    .await
    .map_err(ApiError::from_store)?;
  state
    .store
    .save_filters(link.link_id, new.filters)
    .await
    .map_err(ApiError::from_store)?;
  invalidate_subscribers(state, link.link_id).await?;

  info!(chat_id, link_id = link.link_id, url = %link.url, "link enrolled");
  refreshed(state, link.link_id).await
}

// ─── Unenroll ────────────────────────────────────────────────────────────────

/// `DELETE /links`
pub async fn unenroll<S: ApiStore>(
  State(state): State<AppState<S>>,
  ChatId(chat_id): ChatId,
  ApiJson(body): ApiJson<LinkBody>,
) -> Result<Json<LinkResponse>, ApiError> {
  let link = state
    .store
    .delete_link_by_url(body.link.trim().to_owned(), chat_id)
    .await
    .map_err(ApiError::from_store)?;
  invalidate(&state.links, chat_id).await;

  info!(chat_id, link_id = link.link_id, url = %link.url, "link unenrolled");
  Ok(Json(link.into()))
}

// ─── Tags ────────────────────────────────────────────────────────────────────

/// `POST /links/tags`
pub async fn add_tag<S: ApiStore>(
  State(state): State<AppState<S>>,
  ChatId(chat_id): ChatId,
  ApiJson(body): ApiJson<TagBody>,
) -> Result<Json<LinkResponse>, ApiError> {
  let tag = body.tag.trim().to_owned();
  if tag.is_empty() {
    return Err(ApiError::BadRequest("tag must not be blank".into()));
  }
  let link = subscribed_link(&*state.store, chat_id, &body.link).await?;
  state
    .store
    .add_tag(link.link_id, tag)
    .await
    .map_err(ApiError::from_store)?;
  invalidate_subscribers(&state, link.link_id).await?;
  refreshed(&state, link.link_id).await
}

/// `DELETE /links/tags`
pub async fn remove_tag<S: ApiStore>(
  State(state): State<AppState<S>>,
  ChatId(chat_id): ChatId,
  ApiJson(body): ApiJson<TagBody>,
) -> Result<Json<LinkResponse>, ApiError> {
  let link = subscribed_link(&*state.store, chat_id, &body.link).await?;
  state
    .store
    .remove_tag(link.link_id, body.tag.trim().to_owned())
    .await
    .map_err(ApiError::from_store)?;
  invalidate_subscribers(&state, link.link_id).await?;
  refreshed(&state, link.link_id).await
}

async fn refreshed<S: ApiStore>(
  state: &AppState<S>,
  link_id: i64,
) -> Result<Json<LinkResponse>, ApiError> {
  let link = state
    .store
    .find_link(link_id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| linkwatch_core::Error::LinkNotFound(link_id.to_string()))?;
  Ok(Json(link.into()))
}
