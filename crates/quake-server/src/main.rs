//! Seismic risk predictor server
//!
//! Restores or trains the significant-quake model on startup, then serves
//! predictions, scored recent events, health checks and metrics over HTTP.

use anyhow::{Context, Result};
use quake_lib::{
    health::{components, HealthRegistry},
    ingest::{EventSource, RangeFetcher, UsgsEventSource},
    observability::StructuredLogger,
    predictor::LogisticClassifier,
    ModelLifecycleManager, ModelStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting quake-server");

    let config = config::ServerConfig::load()?;
    info!(
        port = config.api_port,
        model_path = %config.model_path.display(),
        usgs_url = %config.usgs_url,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::EVENT_SOURCE).await;

    let source: Arc<dyn EventSource> = Arc::new(
        UsgsEventSource::new(&config.usgs_url, config.request_timeout())
            .context("Failed to create USGS client")?,
    );
    let fetcher = RangeFetcher::new(source.clone(), config.fetch_config());
    let manager = Arc::new(ModelLifecycleManager::new(
        fetcher,
        LogisticClassifier::new(),
        ModelStore::new(&config.model_path),
        config.lifecycle_config(),
    ));
    health_registry.record_model_state(manager.state()).await;

    let state = manager.load_or_train().await;
    health_registry.record_model_state(state).await;

    let logger = StructuredLogger::new("quake-server");
    logger.log_startup(SERVER_VERSION, state.as_str());

    let app_state = Arc::new(api::AppState::new(
        manager,
        source,
        health_registry.clone(),
    ));

    // Serving starts even without a model; /api/predict retrains on demand
    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_logger.log_shutdown("SIGINT received");
        }
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
