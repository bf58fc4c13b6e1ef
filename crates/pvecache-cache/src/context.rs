use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pvecache_core::config::PvecacheConfig;
use pvecache_core::error::{CacheError, Result};
use pvecache_core::retry::retry;
use pvecache_source::{InventorySource, SourceError, StorageContent};
use tracing::debug;

/// Future returned by [`InventorySource`] methods.
pub(crate) type SourceFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, SourceError>> + Send + 'a>>;

/// Upstream call policy and rebuild parallelism.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Deadline applied to every source call.
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    /// Max instances fetched concurrently within one node rebuild.
    pub instance_concurrency: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            instance_concurrency: 4,
        }
    }
}

impl CacheOptions {
    pub fn from_config(config: &PvecacheConfig) -> Self {
        Self {
            request_timeout: config.pve.request_timeout(),
            retry_attempts: config.sync.retry_attempts,
            retry_base_delay: config.sync.retry_base_delay(),
            instance_concurrency: config.sync.instance_concurrency,
        }
    }
}

/// Source handle plus call policy, shared by every rebuild task.
pub(crate) struct RebuildContext {
    source: Arc<dyn InventorySource>,
    pub(crate) options: CacheOptions,
}

impl RebuildContext {
    pub(crate) fn new(source: Arc<dyn InventorySource>, options: CacheOptions) -> Self {
        Self { source, options }
    }

    /// Run one source call under the deadline and retry policy. Any failure
    /// surfaces as `UpstreamUnreachable` naming `target`.
    pub(crate) async fn call<'a, T, F>(&'a self, target: &str, f: F) -> Result<T>
    where
        F: Fn(&'a dyn InventorySource) -> SourceFuture<'a, T>,
    {
        let timeout = self.options.request_timeout;
        let source: &'a dyn InventorySource = self.source.as_ref();
        retry(
            self.options.retry_attempts,
            self.options.retry_base_delay,
            target,
            move || {
                let fut = f(source);
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(CacheError::upstream(target, e)),
                        Err(_) => Err(CacheError::upstream(target, "request timed out")),
                    }
                }
            },
        )
        .await
    }
}

/// Storage content listings memoized for the span of one rebuild.
///
/// A failed listing is remembered as `None` so sibling volumes on the same
/// storage do not refetch it.
#[derive(Default)]
pub(crate) struct StorageIndex {
    listings: Mutex<HashMap<String, Option<Arc<Vec<StorageContent>>>>>,
}

impl StorageIndex {
    pub(crate) async fn content(
        &self,
        ctx: &RebuildContext,
        node: &str,
        storage: &str,
    ) -> Option<Arc<Vec<StorageContent>>> {
        if let Some(cached) = self.lock().get(storage) {
            return cached.clone();
        }

        let target = format!("{node}/storage/{storage}");
        let listing = match ctx
            .call(&target, |s| s.get_storage_content(node, storage))
            .await
        {
            Ok(content) => Some(Arc::new(content)),
            Err(e) => {
                debug!(node, storage, error = %e, "Storage content unavailable");
                None
            }
        };

        self.lock()
            .entry(storage.to_string())
            .or_insert(listing)
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<Arc<Vec<StorageContent>>>>> {
        self.listings.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fast_options;
    use pvecache_source::mock::{MockNode, MockSource};

    #[tokio::test]
    async fn test_call_maps_failure_to_upstream() {
        let source = Arc::new(MockSource::new());
        source.fail("list_nodes");
        let ctx = RebuildContext::new(source.clone(), fast_options());

        let err = ctx.call("cluster", |s| s.list_nodes()).await.unwrap_err();
        assert!(matches!(err, CacheError::UpstreamUnreachable { .. }));
        assert_eq!(source.calls("list_nodes"), fast_options().retry_attempts as usize);
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let source = Arc::new(MockSource::new());
        source.delay("list_nodes", Duration::from_secs(5));
        let options = CacheOptions {
            request_timeout: Duration::from_millis(20),
            retry_attempts: 1,
            ..fast_options()
        };
        let ctx = RebuildContext::new(source, options);

        let err = ctx.call("cluster", |s| s.list_nodes()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_storage_index_memoizes() {
        let mut node = MockNode::default();
        node.storage.insert("local".into(), vec![]);
        let source = Arc::new(MockSource::new().with_node("pve1", node));
        source.fail("get_storage_content:pve1:ceph");
        let ctx = RebuildContext::new(source.clone(), fast_options());
        let index = StorageIndex::default();

        assert!(index.content(&ctx, "pve1", "local").await.is_some());
        assert!(index.content(&ctx, "pve1", "local").await.is_some());
        assert_eq!(source.calls("get_storage_content:pve1:local"), 1);

        assert!(index.content(&ctx, "pve1", "ceph").await.is_none());
        let failed_calls = source.calls("get_storage_content:pve1:ceph");
        assert!(index.content(&ctx, "pve1", "ceph").await.is_none());
        assert_eq!(source.calls("get_storage_content:pve1:ceph"), failed_calls);
    }
}
