//! Update detection and notification pipeline.
//!
//! The [`scheduler::Scheduler`] pages through links due for a re-check and
//! fans them out to a pool of workers. Each worker runs the
//! [`engine::Engine`], which asks the link's [`probe::Probe`] for the
//! upstream last-modified time, advances the stored watermark, and hands a
//! detected change to the [`dispatch::Dispatcher`]. The dispatcher
//! invalidates subscriber caches and routes the event either to a
//! [`notifier::Notifier`] or into the [`digest::DigestBuffer`].

pub mod config;
pub mod digest;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod factory;
pub mod notifier;
pub mod probe;
pub mod scheduler;

pub use error::{Error, Result};

use linkwatch_core::store::{ChatStore, DetailsStore, LinkStore};

/// Store bound required by the pipeline.
pub trait ScrapperStore: LinkStore + ChatStore + DetailsStore + 'static {}

impl<T: LinkStore + ChatStore + DetailsStore + 'static> ScrapperStore for T {}

/// Shutdown signal shared by the background tasks; flips to `true` once.
pub type Shutdown = tokio::sync::watch::Receiver<bool>;

/// Resolve once `shutdown` is signalled or its sender is gone.
pub async fn cancelled(shutdown: &mut Shutdown) {
  let _ = shutdown.wait_for(|&stop| stop).await;
}

pub fn is_cancelled(shutdown: &Shutdown) -> bool { *shutdown.borrow() }

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;
