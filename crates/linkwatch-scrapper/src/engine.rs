//! Change detection for a single link.

use std::sync::Arc;

use chrono::Utc;
use linkwatch_core::{
  link::{Link, LinkType},
  store::{ChatStore, DetailsStore, LinkStore},
  update::{ContentDetails, LinkUpdate},
};
use tracing::{debug, info, warn};

use crate::{Error, Result, ScrapperStore, dispatch::Dispatcher, factory::ProbeFactory};

/// What a single [`Engine::check`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
  /// Upstream has not moved past the stored watermark.
  Unchanged,
  /// The watermark advanced but nobody subscribes to the link.
  Advanced,
  /// The watermark advanced and an update went out to `chats` subscribers.
  Notified { chats: usize },
  /// A concurrent writer already stored an equal or later watermark.
  Superseded,
}

impl CheckOutcome {
  pub fn changed(self) -> bool {
    matches!(self, Self::Advanced | Self::Notified { .. })
  }
}

pub struct Engine<S> {
  store:      Arc<S>,
  probes:     ProbeFactory,
  dispatcher: Dispatcher,
}

impl<S: ScrapperStore> Engine<S> {
  pub fn new(store: Arc<S>, probes: ProbeFactory, dispatcher: Dispatcher) -> Self {
    Self { store, probes, dispatcher }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Probe `link` upstream and emit an update if it changed.
  ///
  /// `last_checked` is advanced even when the probe fails; the probe error
  /// is then returned.
  pub async fn check(&self, link: &Link) -> Result<CheckOutcome> {
    let probe = self.probes.probe_for(link.link_type, &link.url)?;
    let now = Utc::now();

    let upstream = match probe.last_modified(&link.url).await {
      Ok(at) => at,
      Err(e) => {
        if let Err(store_err) = self.store.record_check(link.link_id, now, None).await {
          warn!(link_id = link.link_id, error = %store_err, "failed to record check time");
        }
        return Err(e);
      }
    };

    let first = link.last_updated.is_none();
    if link.last_updated.is_some_and(|prev| upstream <= prev) {
      self
        .store
        .record_check(link.link_id, now, None)
        .await
        .map_err(Error::store)?;
      debug!(link_id = link.link_id, "no upstream change");
      return Ok(CheckOutcome::Unchanged);
    }

    let advanced = self
      .store
      .record_check(link.link_id, now, Some(upstream))
      .await
      .map_err(Error::store)?;
    if !advanced {
      debug!(link_id = link.link_id, "watermark already advanced elsewhere");
      return Ok(CheckOutcome::Superseded);
    }

    let chats = self
      .store
      .find_chats_by_link(link.link_id)
      .await
      .map_err(Error::store)?;
    if chats.is_empty() {
      info!(link_id = link.link_id, url = %link.url, "change detected with no subscribers");
      return Ok(CheckOutcome::Advanced);
    }

    let details = match probe.details(&link.url).await {
      Ok(details) => {
        if let Err(e) = self.store.upsert_details(link.link_id, details.clone()).await {
          warn!(link_id = link.link_id, error = %e, "failed to store content details");
        }
        Some(details)
      }
      Err(e) => {
        warn!(link_id = link.link_id, error = %e, "content details unavailable");
        None
      }
    };

    let update = LinkUpdate {
      id:          link.link_id,
      url:         link.url.clone(),
      description: describe(link.link_type, &link.url, first, details.as_ref()),
      tg_chat_ids: chats.iter().map(|c| c.chat_id).collect(),
      update_info: details,
    };
    info!(link_id = link.link_id, url = %link.url, chats = chats.len(), first, "update detected");
    self.dispatcher.dispatch(&update, &chats).await;

    Ok(CheckOutcome::Notified { chats: chats.len() })
  }
}

fn describe(
  link_type: LinkType,
  url: &str,
  first: bool,
  details: Option<&ContentDetails>,
) -> String {
  let provider = link_type.provider_name();
  if first {
    return format!("Started tracking {provider} {url}");
  }
  match details {
    Some(d) => format!("New activity in {provider} {url}: {} by {}", d.title, d.author),
    None => format!("New activity in {provider} {url}"),
  }
}
