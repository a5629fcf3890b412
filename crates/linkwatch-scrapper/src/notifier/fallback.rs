use std::sync::Arc;

use async_trait::async_trait;
use linkwatch_core::update::LinkUpdate;
use tracing::warn;

use super::Notifier;
use crate::Result;

/// Tries `primary`, then `secondary`. When both fail the primary's error
/// is returned.
pub struct FallbackNotifier {
  primary:   Arc<dyn Notifier>,
  secondary: Arc<dyn Notifier>,
}

impl FallbackNotifier {
  pub fn new(primary: Arc<dyn Notifier>, secondary: Arc<dyn Notifier>) -> Self {
    Self { primary, secondary }
  }
}

#[async_trait]
impl Notifier for FallbackNotifier {
  fn name(&self) -> &'static str { "fallback" }

  async fn send(&self, update: &LinkUpdate) -> Result<()> {
    let primary_err = match self.primary.send(update).await {
      Ok(()) => return Ok(()),
      Err(e) => e,
    };
    warn!(
      primary = self.primary.name(),
      secondary = self.secondary.name(),
      link_id = update.id,
      error = %primary_err,
      "primary transport failed, falling back",
    );
    match self.secondary.send(update).await {
      Ok(()) => Ok(()),
      Err(e) => {
        warn!(secondary = self.secondary.name(), link_id = update.id, error = %e, "fallback transport failed");
        Err(primary_err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FailingNotifier, RecordingNotifier, sample_update};

  #[tokio::test]
  async fn primary_success_skips_secondary() {
    let primary = Arc::new(RecordingNotifier::default());
    let secondary = Arc::new(RecordingNotifier::default());
    let notifier = FallbackNotifier::new(primary.clone(), secondary.clone());

    notifier.send(&sample_update(1, &[1])).await.unwrap();
    assert_eq!(primary.sent().len(), 1);
    assert!(secondary.sent().is_empty());
  }

  #[tokio::test]
  async fn primary_failure_delivers_via_secondary() {
    let secondary = Arc::new(RecordingNotifier::default());
    let notifier = FallbackNotifier::new(Arc::new(FailingNotifier::new("primary down")), secondary.clone());

    notifier.send(&sample_update(3, &[9])).await.unwrap();
    assert_eq!(secondary.sent().len(), 1);
    assert_eq!(secondary.sent()[0].id, 3);
  }

  #[tokio::test]
  async fn both_failing_returns_primary_error() {
    let notifier = FallbackNotifier::new(
      Arc::new(FailingNotifier::new("primary down")),
      Arc::new(FailingNotifier::new("secondary down")),
    );
    let err = notifier.send(&sample_update(1, &[1])).await.unwrap_err();
    assert_eq!(err.to_string(), "unexpected upstream response: primary down");
  }

  #[tokio::test]
  async fn unreachable_bot_falls_back_to_bus() {
    use std::time::Duration;

    use linkwatch_bus::Bus;

    use crate::{
      notifier::{BusNotifier, HttpNotifier},
      testing::resilient_client,
    };

    let bus = Bus::open_in_memory().await.unwrap();
    let notifier = FallbackNotifier::new(
      Arc::new(HttpNotifier::new(resilient_client(), "http://127.0.0.1:1")),
      Arc::new(BusNotifier::new(bus.producer(Duration::from_secs(1)), "link-updates")),
    );

    notifier.send(&sample_update(11, &[4])).await.unwrap();
    assert_eq!(bus.len("link-updates").await.unwrap(), 1);
  }
}
