//! Asset CDN - static and on-demand transformed images from named repositories
//!
//! Serves files from configured local directories and resizes/re-encodes
//! images on request, keeping processed results in a TTL-bounded disk cache.

mod analytics;
mod config;
mod error;
mod server;
mod types;

use crate::analytics::AnalyticsReporter;
use crate::error::Result;
use crate::server::{cors_layer, start_server, ServerState, SharedState};
use image_transform::RasterTransformer;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("asset_cdn=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting asset CDN...");

    if let Err(e) = run().await {
        error!(error = %e, "Asset CDN failed to start");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = config::load()?;
    match config::config_file() {
        Some(path) => info!("Config file: {:?}", path),
        None => info!("No config file found, using defaults and environment"),
    }
    info!("Cache dir: {:?}", config.cache.directory);
    info!(
        "Default cache storage: max_size={:?}, ttl_ms={}",
        config.cache.storage.max_size, config.cache.storage.ttl_ms
    );

    let base_dir = std::env::current_dir()?;
    let registry = config.repository_registry(&base_dir);
    for repository in registry.repositories() {
        info!(repo = %repository.id, root = ?repository.root, "{}", repository.description);
    }

    let cache = config.image_cache_store(&registry);
    cache.init().await?;

    let transformer = Arc::new(RasterTransformer::new(config.transform_settings()));
    let analytics = AnalyticsReporter::from_config(&config.analytics)?;
    info!("Analytics: {}", if analytics.is_some() { "enabled" } else { "disabled" });

    let state: SharedState = Arc::new(
        ServerState::new(registry, cache, transformer)
            .with_limits(config.validation_limits())
            .with_transform_timeout(config.transform_timeout())
            .with_analytics(analytics),
    );

    // Start HTTP server (blocking)
    start_server(state, cors_layer(&config.cors), &config.server).await?;

    Ok(())
}
