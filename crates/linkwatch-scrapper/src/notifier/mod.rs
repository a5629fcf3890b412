//! Outbound transports for update events.
//!
//! A [`Notifier`] delivers one [`LinkUpdate`] to the chat-facing service.
//! [`HttpNotifier`] posts it, [`BusNotifier`] appends it to the record log,
//! and [`FallbackNotifier`] chains two of them.

mod bus;
mod fallback;
mod http;

use async_trait::async_trait;
use linkwatch_core::update::LinkUpdate;

pub use bus::BusNotifier;
pub use fallback::FallbackNotifier;
pub use http::HttpNotifier;

use crate::Result;

#[async_trait]
pub trait Notifier: Send + Sync {
  /// Short transport name for logs.
  fn name(&self) -> &'static str;

  /// Deliver `update`. Resolves once the transport has accepted it.
  async fn send(&self, update: &LinkUpdate) -> Result<()>;
}
