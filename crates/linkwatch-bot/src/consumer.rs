//! Bus consumer for the `link-updates` topic.
//!
//! Records are handled one at a time in offset order. A record that is not
//! a valid [`LinkUpdate`] is appended to the dead-letter topic, with headers
//! `error` and `timestamp`, before the consumer moves past it. Offsets are
//! committed every `commit_interval` and once more on shutdown.

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use chrono::{SecondsFormat, Utc};
use linkwatch_bus::{Consumer, Producer, ProducerRecord, Record};
use linkwatch_core::update::LinkUpdate;
use tracing::{error, info, warn};

use crate::{Result, Shutdown, delivery::Delivery};

pub const DLQ_KEY: &str = "error";

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
  pub dlq_topic:       String,
  pub commit_interval: Duration,
  /// Idle wait when the topic has no new records.
  pub poll_interval:   Duration,
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
  Delivered { chats: usize },
  DeadLettered,
}

pub struct UpdateConsumer {
  consumer: Consumer,
  dlq:      Producer,
  delivery: Arc<Delivery>,
  settings: ConsumerSettings,
}

impl UpdateConsumer {
  pub fn new(
    consumer: Consumer,
    dlq: Producer,
    delivery: Arc<Delivery>,
    settings: ConsumerSettings,
  ) -> Self {
    Self { consumer, dlq, delivery, settings }
  }

  /// Consume until `shutdown` fires, then commit and close.
  pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
    info!(topic = self.consumer.topic(), from = self.consumer.position(), "update consumer started");
    let mut last_commit = Instant::now();

    while !*shutdown.borrow() {
      let idle = match self.consumer.poll().await {
        Ok(Some(record)) => match self.handle(&record).await {
          Ok(_) => false,
          Err(e) => {
            error!(offset = record.offset, error = %e, "failed to dead-letter record, will retry");
            self.consumer.seek(record.offset);
            true
          }
        },
        Ok(None) => true,
        Err(e) => {
          warn!(error = %e, "poll failed");
          true
        }
      };

      if last_commit.elapsed() >= self.settings.commit_interval {
        if let Err(e) = self.consumer.commit().await {
          warn!(error = %e, "offset commit failed");
        }
        last_commit = Instant::now();
      }

      if idle {
        tokio::select! {
          () = tokio::time::sleep(self.settings.poll_interval) => {}
          _ = shutdown.wait_for(|&stop| stop) => {}
        }
      }
    }

    self.consumer.close().await?;
    Ok(())
  }

  /// Deliver `record`, or dead-letter it when it is not a valid update.
  ///
  /// Fails only when the dead-letter append fails.
  pub async fn handle(&self, record: &Record) -> Result<Handled> {
    let update = match serde_json::from_slice::<LinkUpdate>(&record.value) {
      Ok(update) => update,
      Err(e) => return self.dead_letter(record, &format!("malformed update: {e}")).await,
    };
    if let Err(reason) = update.validate() {
      return self.dead_letter(record, reason).await;
    }
    let chats = self.delivery.deliver(&update).await;
    Ok(Handled::Delivered { chats })
  }

  async fn dead_letter(&self, record: &Record, reason: &str) -> Result<Handled> {
    let dead = ProducerRecord::new(&self.settings.dlq_topic, DLQ_KEY, record.value.clone())
      .header("error", reason)
      .header("timestamp", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    self.dlq.send(dead).await?;
    warn!(offset = record.offset, reason, "record dead-lettered");
    Ok(Handled::DeadLettered)
  }
}
