//! Store traits for links, chats and content details.
//!
//! The traits are implemented by storage backends (e.g.
//! `linkwatch-store-sqlite`). Higher layers (`linkwatch-api`,
//! `linkwatch-scrapper`) depend on these abstractions, not on any concrete
//! backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  chat::{Chat, NotificationSettings},
  link::{Link, NewLink},
  update::ContentDetails,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A backend error that may carry one of the domain error kinds.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The domain error wrapped by this backend error, if any.
  fn domain(&self) -> Option<&crate::Error>;
}

/// Common supertrait fixing one error type across all store traits.
pub trait Store: Send + Sync {
  type Error: StoreError;
}

// ─── Links ───────────────────────────────────────────────────────────────────

pub trait LinkStore: Store {
  /// Persist a new link together with its tags and filters.
  ///
  /// Fails with `LinkAlreadyExists` if the URL is already stored.
  fn save_link(
    &self,
    link: NewLink,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  fn find_link(
    &self,
    link_id: i64,
  ) -> impl Future<Output = Result<Option<Link>, Self::Error>> + Send + '_;

  fn find_link_by_url(
    &self,
    url: String,
  ) -> impl Future<Output = Result<Option<Link>, Self::Error>> + Send + '_;

  /// All links the chat subscribes to, ordered by id.
  fn find_links_by_chat(
    &self,
    chat_id: i64,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  /// Remove the chat↔link edge; delete the link and its details when no
  /// other chat subscribes to it. Returns the link as it was before removal.
  ///
  /// Fails with `LinkNotFound` when the chat is not subscribed to `url`.
  fn delete_link_by_url(
    &self,
    url: String,
    chat_id: i64,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// Write back scan state. Both columns only ever move forward: an earlier
  /// `checked_at` or `updated_at` than the stored value is a no-op.
  ///
  /// Returns `true` when `updated_at` was supplied and advanced the stored
  /// watermark.
  fn record_check(
    &self,
    link_id: i64,
    checked_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Subscribe a chat to a link. Idempotent.
  fn add_chat_link(
    &self,
    chat_id: i64,
    link_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// A page of the due-set: links not checked since `checked_before`,
  /// ordered by `(last_checked ASC NULLS FIRST, link_id ASC)`.
  fn find_due(
    &self,
    limit: usize,
    offset: usize,
    checked_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  /// Replace the link's tag set.
  fn save_tags(
    &self,
    link_id: i64,
    tags: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace the link's filter set.
  fn save_filters(
    &self,
    link_id: i64,
    filters: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append one tag. Fails with `TagAlreadyExists` if present.
  fn add_tag(
    &self,
    link_id: i64,
    tag: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove one tag. Fails with `TagNotFound` if absent.
  fn remove_tag(
    &self,
    link_id: i64,
    tag: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Chats ───────────────────────────────────────────────────────────────────

pub trait ChatStore: Store {
  /// Register a chat. Registering an existing chat is a no-op that returns
  /// the stored chat.
  fn register_chat(
    &self,
    chat_id: i64,
  ) -> impl Future<Output = Result<Chat, Self::Error>> + Send + '_;

  fn find_chat(
    &self,
    chat_id: i64,
  ) -> impl Future<Output = Result<Option<Chat>, Self::Error>> + Send + '_;

  /// Delete a chat and all its edges, garbage-collecting links left without
  /// subscribers. Returns the ids of the collected links.
  fn delete_chat(
    &self,
    chat_id: i64,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  fn chat_link_exists(
    &self,
    chat_id: i64,
    link_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All chats subscribed to a link, ordered by chat id.
  fn find_chats_by_link(
    &self,
    link_id: i64,
  ) -> impl Future<Output = Result<Vec<Chat>, Self::Error>> + Send + '_;

  fn update_notification_settings(
    &self,
    chat_id: i64,
    settings: NotificationSettings,
  ) -> impl Future<Output = Result<Chat, Self::Error>> + Send + '_;
}

// ─── Content details ─────────────────────────────────────────────────────────

pub trait DetailsStore: Store {
  /// Insert or replace the details row keyed by `link_id`.
  fn upsert_details(
    &self,
    link_id: i64,
    details: ContentDetails,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn find_details(
    &self,
    link_id: i64,
  ) -> impl Future<Output = Result<Option<ContentDetails>, Self::Error>>
  + Send
  + '_;
}
