//! linkwatch bot binary.
//!
//! Accepts updates on `POST /updates` and, when the bus transport is in
//! use, from the `link-updates` topic; relays them to Telegram.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use linkwatch_bot::{
  config::BotConfig,
  consumer::UpdateConsumer,
  delivery::Delivery,
  server,
  telegram::TelegramClient,
};
use linkwatch_bus::Bus;
use linkwatch_http::ResilientClient;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "linkwatch bot")]
struct Cli {
  /// Path to an optional TOML configuration file.
  #[arg(short, long, default_value = "bot.toml")]
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
  let cfg = BotConfig::load(Some(cli.config.as_path())).context("failed to load configuration")?;
  if cfg.telegram_token.is_empty() {
    warn!("TELEGRAM_TOKEN is not set; deliveries will fail");
  }

  let client = ResilientClient::new((&cfg.resilience).into()).context("failed to build http client")?;
  let telegram = TelegramClient::new(client, &cfg.telegram_api_url, &cfg.telegram_token);
  let delivery = Arc::new(Delivery::new(telegram));

  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let consumer_task = if cfg.consumes_bus() {
    let bus = Bus::open(&cfg.bus_brokers)
      .await
      .with_context(|| format!("failed to open bus log at {:?}", cfg.bus_brokers))?;
    let consumer = bus
      .consumer(&cfg.consumer_group, &cfg.topic_link_updates)
      .await
      .context("failed to subscribe to updates topic")?;
    let consumer = UpdateConsumer::new(
      consumer,
      bus.producer(cfg.bus_write_timeout),
      delivery.clone(),
      cfg.consumer(),
    );
    Some(tokio::spawn(consumer.run(shutdown_rx.clone())))
  } else {
    None
  };

  let address = cfg.listen_addr();
  let listener = TcpListener::bind(address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!(%address, bus = cfg.consumes_bus(), "bot listening");

  axum::serve(listener, server::router(delivery))
    .with_graceful_shutdown(async move {
      if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
      }
      info!("shutdown requested");
      let _ = shutdown_tx.send(true);
    })
    .await
    .context("server error")?;

  if let Some(task) = consumer_task {
    task
      .await
      .context("consumer task panicked")?
      .context("consumer failed to close")?;
  }
  Ok(())
}
