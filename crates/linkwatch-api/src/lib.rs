//! JSON REST API of the linkwatch scrapper.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`LinkStore`] and [`ChatStore`], with a [`LinkListCache`] in front of the
//! per-chat link listing. Every handler that changes a chat's subscriptions
//! invalidates that chat's cached list before it responds.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = linkwatch_api::router(AppState::new(store, links));
//! let app = linkwatch_api::rate_limit::layer(app, limiter);
//! ```

pub mod chats;
pub mod error;
pub mod extract;
pub mod links;
pub mod rate_limit;
pub mod settings;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use linkwatch_cache::LinkListCache;
use linkwatch_core::store::{ChatStore, LinkStore};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Store bound required by the API.
pub trait ApiStore: LinkStore + ChatStore + 'static {}

impl<T: LinkStore + ChatStore + 'static> ApiStore for T {}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store: Arc<S>,
  pub links: LinkListCache,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, links: LinkListCache) -> Self {
    Self { store, links }
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), links: self.links.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the scrapper API router for `state`.
pub fn router<S: ApiStore>(state: AppState<S>) -> Router {
  Router::new()
    // Chats
    .route("/tg-chat/{id}", post(chats::register::<S>).delete(chats::delete::<S>))
    // Links
    .route(
      "/links",
      get(links::list::<S>)
        .post(links::enroll::<S>)
        .delete(links::unenroll::<S>),
    )
    .route("/links/tags", post(links::add_tag::<S>).delete(links::remove_tag::<S>))
    // Settings
    .route("/notification-settings", post(settings::update::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
