use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use pvecache_cache::{NodeRebuildReport, SyncReport};
use pvecache_core::API_VERSION;
use pvecache_core::model::{DeviceSnapshot, InstanceSnapshot, NodeSnapshot};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub api_version: &'static str,
    pub pve_version: String,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn version_handler(
    State(state): State<AppState>,
) -> Result<Json<VersionResponse>, ApiError> {
    let upstream = state.cache.source_version().await?;
    Ok(Json(VersionResponse {
        api_version: API_VERSION,
        pve_version: upstream.version,
    }))
}

pub async fn node_handler(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> Result<Json<NodeSnapshot>, ApiError> {
    Ok(Json(state.cache.get_node(&node).await?))
}

pub async fn node_devices_handler(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> Result<Json<BTreeMap<String, DeviceSnapshot>>, ApiError> {
    Ok(Json(state.cache.get_node_devices(&node).await?))
}

pub async fn instance_handler(
    State(state): State<AppState>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<InstanceSnapshot>, ApiError> {
    Ok(Json(state.cache.get_instance(&node, vmid).await?))
}

pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    info!("Full sync requested");
    Ok(Json(state.cache.sync().await?))
}

pub async fn node_sync_handler(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> Result<Json<NodeRebuildReport>, ApiError> {
    info!(node = %node, "Node sync requested");
    Ok(Json(state.cache.rebuild_host(&node).await?))
}

pub async fn instance_sync_handler(
    State(state): State<AppState>,
    Path((node, vmid)): Path<(String, u32)>,
) -> Result<Json<InstanceSnapshot>, ApiError> {
    info!(node = %node, vmid, "Instance sync requested");
    Ok(Json(state.cache.rebuild_instance(&node, vmid).await?))
}
