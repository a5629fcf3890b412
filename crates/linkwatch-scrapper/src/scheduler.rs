//! Periodic sweeps over the due-set with a fixed pool of workers.
//!
//! A sweep pages through links not checked since the sweep started. Each
//! page is pushed through a bounded channel to `workers` tasks running the
//! [`Engine`]. Engine errors and panics are contained per link; the sweep
//! itself only fails when the store cannot list due links.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use linkwatch_core::{link::Link, store::LinkStore};
use tokio::{
  sync::{Mutex, mpsc},
  time::MissedTickBehavior,
};
use tracing::{error, info, warn};

use crate::{
  Error, Result, ScrapperStore, Shutdown, cancelled, engine::Engine, is_cancelled,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  pub interval:   Duration,
  pub batch_size: usize,
  pub workers:    usize,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self { interval: Duration::from_secs(60), batch_size: 100, workers: 4 }
  }
}

/// Per-sweep counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// Links the engine finished with, successfully or not.
  pub processed: usize,
  /// Links whose watermark advanced.
  pub changed:   usize,
  /// Links whose check errored or panicked.
  pub failed:    usize,
  /// Links skipped because shutdown was signalled.
  pub cancelled: usize,
}

impl SweepReport {
  fn absorb(&mut self, other: SweepReport) {
    self.processed += other.processed;
    self.changed += other.changed;
    self.failed += other.failed;
    self.cancelled += other.cancelled;
  }
}

pub struct Scheduler<S> {
  engine: Arc<Engine<S>>,
  config: SchedulerConfig,
}

impl<S: ScrapperStore> Scheduler<S> {
  pub fn new(engine: Arc<Engine<S>>, config: SchedulerConfig) -> Self {
    Self { engine, config }
  }

  /// Sweep on every tick until `shutdown` fires.
  pub async fn run(&self, mut shutdown: Shutdown) {
    let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        () = cancelled(&mut shutdown) => break,
      }
      if let Err(e) = self.sweep(&shutdown).await {
        warn!(error = %e, "sweep aborted");
      }
    }
    info!("scheduler stopped");
  }

  /// Check every link that was due when the sweep started, once.
  pub async fn sweep(&self, shutdown: &Shutdown) -> Result<SweepReport> {
    let started = Utc::now();
    let batch_size = self.config.batch_size.max(1);
    let mut report = SweepReport::default();
    let mut offset = 0;

    loop {
      let batch = self
        .engine
        .store()
        .find_due(batch_size, offset, started)
        .await
        .map_err(Error::store)?;
      if batch.is_empty() {
        break;
      }

      let ids: Vec<i64> = batch.iter().map(|l| l.link_id).collect();
      report.absorb(self.run_batch(batch, shutdown).await);
      offset += self.still_due(&ids, started).await?;
      if is_cancelled(shutdown) {
        report.cancelled += self.count_from(offset, started).await?;
        break;
      }
    }

    info!(
      processed = report.processed,
      changed = report.changed,
      failed = report.failed,
      cancelled = report.cancelled,
      "sweep finished",
    );
    Ok(report)
  }

  async fn run_batch(&self, batch: Vec<Link>, shutdown: &Shutdown) -> SweepReport {
    let workers = self.config.workers.max(1);
    let (tx, rx) = mpsc::channel::<Link>(workers * 2);
    let rx = Arc::new(Mutex::new(rx));

    let handles: Vec<_> = (0..workers)
      .map(|_| {
        let rx = Arc::clone(&rx);
        let engine = Arc::clone(&self.engine);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { work(engine, rx, shutdown).await })
      })
      .collect();

    for link in batch {
      if tx.send(link).await.is_err() {
        break;
      }
    }
    drop(tx);

    let mut report = SweepReport::default();
    for joined in futures::future::join_all(handles).await {
      match joined {
        Ok(partial) => report.absorb(partial),
        Err(e) => error!(error = %e, "sweep worker died"),
      }
    }
    report
  }

  /// Size of the due-set past `offset`, i.e. links no batch has reached yet.
  async fn count_from(&self, mut offset: usize, started: DateTime<Utc>) -> Result<usize> {
    let batch_size = self.config.batch_size.max(1);
    let mut remaining = 0;
    loop {
      let page = self
        .engine
        .store()
        .find_due(batch_size, offset, started)
        .await
        .map_err(Error::store)?;
      if page.is_empty() {
        return Ok(remaining);
      }
      remaining += page.len();
      offset += page.len();
    }
  }

  /// How many of `ids` are still in this sweep's due-set.
  async fn still_due(&self, ids: &[i64], started: DateTime<Utc>) -> Result<usize> {
    let mut due = 0;
    for &id in ids {
      let link = self.engine.store().find_link(id).await.map_err(Error::store)?;
      if link.is_some_and(|l| l.last_checked.is_none_or(|at| at < started)) {
        due += 1;
      }
    }
    Ok(due)
  }
}

async fn work<S: ScrapperStore>(
  engine: Arc<Engine<S>>,
  rx: Arc<Mutex<mpsc::Receiver<Link>>>,
  shutdown: Shutdown,
) -> SweepReport {
  let mut report = SweepReport::default();
  loop {
    let next = rx.lock().await.recv().await;
    let Some(link) = next else { break };

    if is_cancelled(&shutdown) {
      report.cancelled += 1;
      continue;
    }

    report.processed += 1;
    match AssertUnwindSafe(engine.check(&link)).catch_unwind().await {
      Ok(Ok(outcome)) => {
        if outcome.changed() {
          report.changed += 1;
        }
      }
      Ok(Err(e)) => {
        report.failed += 1;
        warn!(link_id = link.link_id, url = %link.url, error = %e, "link check failed");
      }
      Err(panic) => {
        report.failed += 1;
        let message = panic
          .downcast_ref::<String>()
          .map(String::as_str)
          .or_else(|| panic.downcast_ref::<&str>().copied())
          .unwrap_or("unknown panic");
        error!(link_id = link.link_id, url = %link.url, panic = message, "link check panicked");
      }
    }
  }
  report
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use linkwatch_cache::{LinkListCache, MemoryCache};
  use linkwatch_core::{
    link::{LinkType, NewLink},
    store::ChatStore,
  };
  use linkwatch_store_sqlite::SqliteStore;
  use tokio::sync::watch;

  use super::*;
  use crate::{
    dispatch::Dispatcher,
    factory::ProbeFactory,
    testing::{FakeProbe, RecordingNotifier, at},
  };

  struct Fixture {
    scheduler: Scheduler<SqliteStore>,
    store:     Arc<SqliteStore>,
    probe:     Arc<FakeProbe>,
    notifier:  Arc<RecordingNotifier>,
  }

  async fn fixture(urls: &[String], workers: usize) -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store.register_chat(1).await.unwrap();
    let probe = FakeProbe::new(LinkType::GithubRepo).arc();
    for (i, url) in urls.iter().enumerate() {
      let link = store
        .save_link(NewLink::parse(url, vec![], vec![]).unwrap())
        .await
        .unwrap();
      store.add_chat_link(1, link.link_id).await.unwrap();
      if !url.ends_with("missing") {
        probe.set(url, at(i as i64));
      }
    }

    let notifier = Arc::new(RecordingNotifier::default());
    let cache = LinkListCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
    let engine = Engine::new(
      store.clone(),
      ProbeFactory::new().register(probe.clone()),
      Dispatcher::new(notifier.clone(), cache, None),
    );
    let config = SchedulerConfig { interval: Duration::from_millis(10), batch_size: 3, workers };
    Fixture { scheduler: Scheduler::new(Arc::new(engine), config), store, probe, notifier }
  }

  fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://github.com/owner/repo{i}")).collect()
  }

  #[tokio::test]
  async fn sweep_checks_every_due_link_once() {
    let f = fixture(&urls(10), 4).await;
    let (_tx, rx) = watch::channel(false);

    let report = f.scheduler.sweep(&rx).await.unwrap();
    assert_eq!(report, SweepReport { processed: 10, changed: 10, failed: 0, cancelled: 0 });
    assert_eq!(f.probe.calls(), 10);
    assert_eq!(f.notifier.sent().len(), 10);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let again = f.scheduler.sweep(&rx).await.unwrap();
    assert_eq!(again.changed, 0);
    assert_eq!(again.processed, 10);
    assert_eq!(f.notifier.sent().len(), 10);
  }

  #[tokio::test]
  async fn failures_and_panics_are_contained() {
    let mut list = urls(5);
    list.push("https://github.com/owner/missing".into());
    list.push("https://github.com/owner/panic".into());
    let f = fixture(&list, 2).await;
    let (_tx, rx) = watch::channel(false);

    let report = f.scheduler.sweep(&rx).await.unwrap();
    assert_eq!(report.processed, 7);
    assert_eq!(report.changed, 5);
    assert_eq!(report.failed, 2);
    assert_eq!(f.probe.calls(), 7);

    let failed = f
      .store
      .find_link_by_url("https://github.com/owner/missing".into())
      .await
      .unwrap()
      .unwrap();
    assert!(failed.last_checked.is_some());
  }

  #[tokio::test]
  async fn cancelled_sweep_counts_the_whole_due_set() {
    let f = fixture(&urls(8), 2).await;
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    // Three pages of three; none of them is checked.
    let report = f.scheduler.sweep(&rx).await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.cancelled, 8);
    assert_eq!(f.probe.calls(), 0);
  }

  #[tokio::test]
  async fn cancellation_mid_sweep_counts_unreached_pages() {
    let f = fixture(&urls(7), 1).await;
    let (tx, rx) = watch::channel(false);

    // Stop once the first link has been checked.
    let probe = f.probe.clone();
    let stopper = tokio::spawn(async move {
      while probe.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
      }
      tx.send(true).unwrap();
    });

    let report = f.scheduler.sweep(&rx).await.unwrap();
    stopper.await.unwrap();
    assert!(report.processed >= 1);
    assert_eq!(report.processed + report.cancelled, 7);
    assert_eq!(report.failed, 0);
  }

  #[tokio::test]
  async fn run_stops_on_shutdown() {
    let f = fixture(&urls(2), 1).await;
    let (tx, rx) = watch::channel(false);

    let run = f.scheduler.run(rx);
    let stop = async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      tx.send(true).unwrap();
    };
    tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(run, stop) })
      .await
      .unwrap();
    assert_eq!(f.notifier.sent().len(), 2);
  }
}
