//! Periodic full sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::cluster::ClusterCache;

/// Sync immediately, then every `interval`, until `shutdown` flips to true
/// or its sender is dropped. A sync in progress at shutdown is abandoned;
/// nodes already rebuilt stay in the cache.
pub async fn sync_loop(
    cluster: Arc<ClusterCache>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "Periodic sync started");

    loop {
        tokio::select! {
            result = cluster.sync() => {
                if let Err(e) = result {
                    warn!(error = %e, "Cluster sync failed, keeping previous view");
                }
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }

    info!("Periodic sync stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fast_options, fixture_source};

    #[tokio::test]
    async fn test_loop_syncs_until_shutdown() {
        let source = Arc::new(fixture_source());
        let cluster = Arc::new(ClusterCache::new(source.clone(), fast_options()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(sync_loop(
            Arc::clone(&cluster),
            Duration::from_millis(20),
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(110)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(cluster.node_names().await, vec!["pve1"]);
        assert!(source.calls("list_nodes") >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_inflight_sync() {
        let source = Arc::new(fixture_source());
        source.delay("list_nodes", Duration::from_secs(30));
        let cluster = Arc::new(ClusterCache::new(source, fast_options()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(sync_loop(Arc::clone(&cluster), Duration::from_secs(60), rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(cluster.node_names().await.is_empty());
    }
}
