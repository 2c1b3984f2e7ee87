mod api;
mod config;
mod expiring;
mod grid;
mod grid_manager;
mod notify;
mod parser;
mod standing;
mod store;
mod tenants;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::grid::Grid;
use crate::grid_manager::GridHandle;
use crate::notify::delivery::{Delivery, LogDelivery};
use crate::notify::discord::DiscordDelivery;
use crate::notify::engine::NotificationEngine;
use crate::notify::NotifierHandle;
use crate::store::SqliteBlobStore;
use crate::tenants::StaticTenantDirectory;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gridscoutd=info"))
        )
        .init();

    tracing::info!("Starting gridscoutd");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/gridscout/gridscoutd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {} ({} tenants)", config_path, config.tenants.len());

    let store = SqliteBlobStore::open(&config.store.db_path)?;
    tracing::info!(
        "Opened database at {:?} ({} stored collections)",
        config.store.db_path,
        store.keys()?.len()
    );

    let grid_handle = GridHandle::spawn(Grid::new(store, &config.store));

    let delivery: Arc<dyn Delivery> = match std::env::var(&config.discord.token_env) {
        Ok(token) if !token.trim().is_empty() => {
            tracing::info!("Delivering notifications through {}", config.discord.api_base);
            Arc::new(DiscordDelivery::new(&config.discord, token)?)
        }
        _ => {
            tracing::warn!("{} is not set; notifications will only be logged", config.discord.token_env);
            Arc::new(LogDelivery)
        }
    };
    let tenants = Arc::new(StaticTenantDirectory::new(config.tenants.clone()));
    let engine = NotificationEngine::new(delivery, tenants, &config.notify);

    let cancel = CancellationToken::new();

    let (notifier, notify_rx) = NotifierHandle::channel(config.notify.queue_depth);
    let notify_cancel = cancel.clone();
    let notify_handle = tokio::spawn(async move {
        if let Err(e) = notify::run(engine, notify_rx, notify_cancel).await {
            tracing::error!("Notifier error: {}", e);
        }
    });

    let app_state = api::routes::AppState {
        grid: grid_handle.clone(),
        notifier,
    };
    let app = api::routes::router(app_state, config.api.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(notify_handle, server_handle);

    if let Err(e) = grid_handle.shutdown().await {
        tracing::error!("Failed to shutdown grid: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
