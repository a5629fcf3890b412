use async_trait::async_trait;
use linkwatch_bus::{Producer, ProducerRecord};
use linkwatch_core::update::LinkUpdate;
use tracing::debug;

use super::Notifier;
use crate::Result;

/// Appends updates to a bus topic, keyed by link id.
pub struct BusNotifier {
  producer: Producer,
  topic:    String,
}

impl BusNotifier {
  pub fn new(producer: Producer, topic: impl Into<String>) -> Self {
    Self { producer, topic: topic.into() }
  }
}

#[async_trait]
impl Notifier for BusNotifier {
  fn name(&self) -> &'static str { "bus" }

  async fn send(&self, update: &LinkUpdate) -> Result<()> {
    let value = serde_json::to_vec(update)?;
    let record = ProducerRecord::new(&self.topic, update.id.to_string(), value);
    let offset = self.producer.send(record).await?;
    debug!(topic = %self.topic, offset, link_id = update.id, "update published");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use linkwatch_bus::Bus;

  use super::*;
  use crate::testing::sample_update;

  #[tokio::test]
  async fn record_is_keyed_by_link_id() {
    let bus = Bus::open_in_memory().await.unwrap();
    let notifier = BusNotifier::new(bus.producer(Duration::from_secs(1)), "link-updates");

    let update = sample_update(42, &[5]);
    notifier.send(&update).await.unwrap();

    let record = bus.fetch("link-updates", 0).await.unwrap().unwrap();
    assert_eq!(record.key.as_deref(), Some("42"));
    let decoded: LinkUpdate = serde_json::from_slice(&record.value).unwrap();
    assert_eq!(decoded, update);
  }
}
