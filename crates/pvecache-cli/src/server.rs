//! Daemon: HTTP surface plus the periodic sync loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use pvecache_cache::sync::sync_loop;
use pvecache_cache::{CacheOptions, ClusterCache};
use pvecache_core::config::PvecacheConfig;
use pvecache_source::PveClient;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::api::{AppState, create_router};

/// Build the cache over the configured PVE endpoint.
pub fn build_cache(config: &PvecacheConfig) -> Result<Arc<ClusterCache>> {
    let client = PveClient::new(&config.pve).context("Failed to build PVE API client")?;
    Ok(Arc::new(ClusterCache::new(
        Arc::new(client),
        CacheOptions::from_config(config),
    )))
}

/// Serve until ctrl-c, syncing every `sync.interval_secs`.
pub async fn serve(config: PvecacheConfig) -> Result<()> {
    let cache = build_cache(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_handle = tokio::spawn(sync_loop(
        Arc::clone(&cache),
        config.sync.interval(),
        shutdown_rx.clone(),
    ));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", config.listen))?;
    info!(listen = %config.listen, upstream = %config.pve.url, "pvecache listening");

    let app = create_router(AppState::new(cache));
    let mut shutdown = shutdown_rx;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
    });
    let server_handle = tokio::spawn(async move { server.await });

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for ctrl-c")?;
    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    let _ = sync_handle.await;
    server_handle
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server failed")?;

    info!("pvecache stopped");
    Ok(())
}
