//! Chat-facing side of linkwatch.
//!
//! Receives [`LinkUpdate`](linkwatch_core::update::LinkUpdate)s either over
//! `POST /updates` ([`server`]) or from the `link-updates` bus topic
//! ([`consumer`]) and relays them to Telegram chats ([`delivery`]).

pub mod config;
pub mod consumer;
pub mod delivery;
pub mod error;
pub mod server;
pub mod telegram;

pub use error::{Error, Result};

/// Shutdown signal; flips to `true` once.
pub type Shutdown = tokio::sync::watch::Receiver<bool>;
