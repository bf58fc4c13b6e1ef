use std::sync::Arc;

use pvecache_cache::ClusterCache;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ClusterCache>,
}

impl AppState {
    pub fn new(cache: Arc<ClusterCache>) -> Self {
        Self { cache }
    }
}
