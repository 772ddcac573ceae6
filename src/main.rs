//! Sitekeeper - visitor analytics and post archive for a small multilingual website
//!
//! - Counts page views per day and per path, with approximate unique visitors
//! - Keeps the 50 most recent channel posts in a bounded JSON archive
//! - Serves both over a small JSON API next to the site's static files

mod archive;
mod clock;
mod config;
mod error;
mod events;
mod fsutil;
mod visitors;
mod web;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::archive::PostArchive;
use crate::clock::{SharedClock, SystemClock};
use crate::events::EventBus;
use crate::visitors::{start_cleanup_task, StatsFile, VisitorCounter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;

    // RUST_LOG wins over the configured level
    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Sitekeeper...");
    info!("Configuration loaded");

    let clock: SharedClock = Arc::new(SystemClock);

    // Visitor counter and its daily retention pass
    let visitors = Arc::new(
        VisitorCounter::open(
            StatsFile::new(config.storage.stats_path()),
            &config.visitors,
            clock,
        )
        .await?,
    );
    let cleanup = start_cleanup_task(visitors.clone(), config.visitors.cleanup_interval());
    info!("Visitor counter initialized");

    // Create event bus for broadcasting archive changes
    let (event_tx, _) = tokio::sync::broadcast::channel(100);
    let event_bus = EventBus::new(event_tx);

    let archive = Arc::new(PostArchive::new(
        config.storage.posts_path(),
        config.archive.max_posts,
        event_bus.clone(),
    ));
    archive.init_storage().await?;
    info!("Post archive initialized ({})", archive.path().display());
    if config.ingestion_enabled() {
        info!("Post ingestion enabled on POST /api/posts");
    }

    let state = Arc::new(web::AppState {
        visitors: visitors.clone(),
        archive,
        event_bus,
        ingest_token: config.archive.ingest_token.clone(),
    });

    // Start web server (blocking until Ctrl+C)
    web::start_server(&config, state, shutdown_signal()).await?;

    cleanup.abort();
    if let Err(e) = visitors.flush().await {
        error!("Failed to save visitor stats on shutdown: {}", e);
    }
    info!("Sitekeeper stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
