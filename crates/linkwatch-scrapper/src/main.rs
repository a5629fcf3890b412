//! linkwatch scrapper binary.
//!
//! Serves the link-management API, sweeps tracked links for upstream
//! changes, and forwards detected updates to the bot over HTTP or the bus.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use linkwatch_api::{
  AppState,
  rate_limit::{self, RateLimiter},
};
use linkwatch_bus::Bus;
use linkwatch_cache::LinkListCache;
use linkwatch_http::ResilientClient;
use linkwatch_scrapper::{
  config::{ScrapperConfig, Transport},
  digest::{self, DigestBuffer},
  dispatch::Dispatcher,
  engine::Engine,
  factory::ProbeFactory,
  notifier::{BusNotifier, FallbackNotifier, HttpNotifier, Notifier},
  scheduler::Scheduler,
};
use linkwatch_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "linkwatch scrapper")]
struct Cli {
  /// Path to an optional TOML configuration file.
  #[arg(short, long, default_value = "scrapper.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ScrapperConfig::load(Some(cli.config.as_path())).context("failed to load configuration")?;
  let digest_time = cfg.digest_time().context("invalid digest time")?;

  // Storage and shared clients.
  let store = SqliteStore::open(&cfg.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.database_path))?;
  let store = Arc::new(store);
  let client = ResilientClient::new((&cfg.resilience).into()).context("failed to build http client")?;
  let cache = linkwatch_cache::open(&cfg.cache_url)
    .await
    .with_context(|| format!("failed to open cache {:?}", cfg.cache_url))?;
  let links = LinkListCache::new(cache.clone(), cfg.cache_ttl);

  // Detection pipeline.
  let notifier = build_notifier(&cfg, client.clone()).await?;
  let digest = cfg
    .digest_enabled
    .then(|| Arc::new(DigestBuffer::new(cache.clone(), cfg.digest_ttl, cfg.digest_max_entries)));
  let probes = ProbeFactory::standard(
    client,
    &cfg.github_api_url,
    cfg.github_token.clone(),
    &cfg.stackoverflow_api_url,
  );
  let dispatcher = Dispatcher::new(notifier.clone(), links.clone(), digest.clone());
  let engine = Arc::new(Engine::new(store.clone(), probes, dispatcher));
  let scheduler = Scheduler::new(engine, cfg.scheduler());

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let sweeps = {
    let shutdown = shutdown_rx.clone();
    tokio::spawn(async move { scheduler.run(shutdown).await })
  };
  let digests = digest.map(|buffer| digest::spawn(buffer, notifier, digest_time, shutdown_rx.clone()));

  // HTTP API.
  let limiter = Arc::new(RateLimiter::new(cfg.rate_limit()));
  let _purger = rate_limit::spawn_purger(limiter.clone());
  let app = rate_limit::layer(linkwatch_api::router(AppState::new(store, links)), limiter);

  let address = cfg.listen_addr();
  let listener = TcpListener::bind(address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!(%address, transport = ?cfg.message_transport, "scrapper listening");

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(async move {
      if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
      }
      info!("shutdown requested");
      let _ = shutdown_tx.send(true);
    })
    .await
    .context("server error")?;

  sweeps.await.context("scheduler task panicked")?;
  if let Some(task) = digests {
    task.await.context("digest task panicked")?;
  }
  Ok(())
}

/// The configured transport, wrapped in a fallback to the other one when
/// `message_fallback` is set.
async fn build_notifier(
  cfg: &ScrapperConfig,
  client: ResilientClient,
) -> anyhow::Result<Arc<dyn Notifier>> {
  let http: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(client, &cfg.bot_url));
  let needs_bus = cfg.message_transport == Transport::Kafka || cfg.message_fallback;
  if !needs_bus {
    return Ok(http);
  }

  let bus = Bus::open(&cfg.bus_brokers)
    .await
    .with_context(|| format!("failed to open bus log at {:?}", cfg.bus_brokers))?;
  let bus: Arc<dyn Notifier> = Arc::new(BusNotifier::new(
    bus.producer(cfg.bus_write_timeout),
    &cfg.topic_link_updates,
  ));

  Ok(match (cfg.message_transport, cfg.message_fallback) {
    (Transport::Http, false) => http,
    (Transport::Kafka, false) => bus,
    (Transport::Http, true) => Arc::new(FallbackNotifier::new(http, bus)),
    (Transport::Kafka, true) => Arc::new(FallbackNotifier::new(bus, http)),
  })
}
