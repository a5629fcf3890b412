//! Domain model shared by every linkwatch crate: links, chats, update
//! events, and the store traits the scrapper and its API are written
//! against.
//!
//! No HTTP, cache or database code lives here.

pub mod chat;
pub mod duration;
pub mod error;
pub mod link;
pub mod store;
pub mod update;

pub use error::{Error, Result};
