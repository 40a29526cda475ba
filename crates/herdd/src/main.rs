//! Herdd - community animal registry bot
//!
//! Registers animals by photo, re-identifies them from new photos, and
//! broadcasts alerts when an animal is reported missing.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chrono::Duration as ChronoDuration;
use herdd::bot;
use herdd::config::Config;
use herdd::dispatch::Dispatcher;
use herdd::registry::Registry;
use herdd::session::SessionTable;
use herdd::store::Store;
use herdd::telegram::TelegramGateway;
use herdd::vision::HttpVision;
use std::time::Duration;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Herdd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load());
    ensure!(
        !config.transport.bot_token.is_empty(),
        "transport.bot_token must be set in the config"
    );

    let registry = Registry::open(Store::new(config.storage.data_dir.clone()))
        .context("failed to open the registry")?;

    let gateway = Arc::new(
        TelegramGateway::new(&config.transport).context("failed to build the transport client")?,
    );
    let vision = Arc::new(
        HttpVision::new(&config.vision).context("failed to build the inference client")?,
    );
    let sessions = SessionTable::new(ChronoDuration::seconds(
        config.session.idle_ttl_secs as i64,
    ));
    let sweep_interval = Duration::from_secs(config.session.sweep_interval_secs);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gateway),
        vision,
        registry,
        sessions.clone(),
        Arc::clone(&config),
    ));

    info!("Herdd ready");

    tokio::select! {
        result = bot::run(gateway, dispatcher, sessions, sweep_interval) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
            Ok(())
        }
    }
}
