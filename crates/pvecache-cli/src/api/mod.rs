//! HTTP read and resync surface over the cluster cache.
//!
//! # Endpoints
//!
//! - `GET /health` - liveness
//! - `GET /version` - API and upstream versions
//! - `GET /nodes/{node}` - node snapshot
//! - `GET /nodes/{node}/devices` - device map of a node
//! - `GET /nodes/{node}/instances/{vmid}` - instance snapshot
//! - `POST /sync` - full sync
//! - `POST /nodes/{node}/sync` - rebuild one node
//! - `POST /nodes/{node}/instances/{vmid}/sync` - rebuild one instance

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
