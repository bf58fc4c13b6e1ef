use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Build the router with every read and resync endpoint.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/version", get(handlers::version_handler))
        .route("/sync", post(handlers::sync_handler))
        .route("/nodes/{node}", get(handlers::node_handler))
        .route("/nodes/{node}/devices", get(handlers::node_devices_handler))
        .route("/nodes/{node}/sync", post(handlers::node_sync_handler))
        .route(
            "/nodes/{node}/instances/{vmid}",
            get(handlers::instance_handler),
        )
        .route(
            "/nodes/{node}/instances/{vmid}/sync",
            post(handlers::instance_sync_handler),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
