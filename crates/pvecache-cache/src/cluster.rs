//! Cluster cache: the root of the hierarchy and the entry point for every
//! read and rebuild.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use pvecache_core::error::{CacheError, Result};
use pvecache_core::model::{DeviceSnapshot, InstanceSnapshot, InstanceType, NodeSnapshot};
use pvecache_source::{InventorySource, VersionInfo};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::context::{CacheOptions, RebuildContext, StorageIndex};
use crate::flight::Flights;
use crate::instance::InstanceState;
use crate::node::{NodeCache, NodeState};
use crate::report::{NodeFailure, NodeRebuildReport, SyncReport};

const SYNC_KEY: &str = "cluster";

pub struct ClusterCache {
    ctx: Arc<RebuildContext>,
    nodes: RwLock<HashMap<String, Arc<NodeCache>>>,
    sync_flight: Flights<Result<SyncReport>>,
    node_flights: Flights<Result<NodeRebuildReport>>,
    instance_flights: Flights<Result<InstanceSnapshot>>,
}

impl ClusterCache {
    /// An empty cache over `source`. Nothing is fetched until the first
    /// [`sync`](Self::sync) or rebuild.
    pub fn new(source: Arc<dyn InventorySource>, options: CacheOptions) -> Self {
        Self {
            ctx: Arc::new(RebuildContext::new(source, options)),
            nodes: RwLock::new(HashMap::new()),
            sync_flight: Flights::new(),
            node_flights: Flights::new(),
            instance_flights: Flights::new(),
        }
    }

    /// Rebuild every node the source lists.
    ///
    /// If the node listing itself fails the previous view is kept and the
    /// error returned. Otherwise each node is rebuilt in turn; nodes that
    /// fail, and nodes no longer listed, are dropped from the cache.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.sync_flight.run(SYNC_KEY, || self.sync_nodes()).await
    }

    async fn sync_nodes(&self) -> Result<SyncReport> {
        let started_at = Utc::now();
        let names = self.ctx.call(SYNC_KEY, |s| s.list_nodes()).await?;
        info!(nodes = names.len(), "Starting cluster sync");

        let mut synced = Vec::new();
        let mut failed = Vec::new();
        for name in &names {
            match self.rebuild_host(name).await {
                Ok(report) => synced.push(report),
                Err(e) => {
                    error!(node = %name, error = %e, "Node rebuild failed, dropping node");
                    failed.push(NodeFailure {
                        node: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let keep: HashSet<&str> = synced.iter().map(|r| r.node.as_str()).collect();
        self.nodes
            .write()
            .await
            .retain(|name, _| keep.contains(name.as_str()));

        let report = SyncReport {
            started_at,
            finished_at: Utc::now(),
            synced,
            failed,
        };
        info!(
            nodes = report.synced.len(),
            failed_nodes = report.failed.len(),
            instances = report.instance_count(),
            failed_instances = report.instance_failure_count(),
            "Cluster sync complete"
        );
        Ok(report)
    }

    /// Rebuild a single node. Concurrent calls for the same node share one
    /// rebuild. On failure the previously cached node, if any, is kept.
    pub async fn rebuild_host(&self, name: &str) -> Result<NodeRebuildReport> {
        self.node_flights
            .run(name, || async {
                let (state, report) = NodeState::rebuild(&self.ctx, name).await?;
                let existing = self.nodes.read().await.get(name).cloned();
                match existing {
                    Some(node) => node.replace(state).await,
                    None => {
                        self.nodes
                            .write()
                            .await
                            .insert(name.to_string(), Arc::new(NodeCache::new(name, state)));
                    }
                }
                info!(
                    node = %name,
                    instances = report.instances,
                    devices = report.devices,
                    failures = report.failures.len(),
                    "Node rebuilt"
                );
                Ok(report)
            })
            .await
    }

    /// Rebuild one instance of a cached node and return its new snapshot.
    ///
    /// An instance the source no longer lists is removed from the node and
    /// reported as not found.
    pub async fn rebuild_instance(&self, node: &str, vmid: u32) -> Result<InstanceSnapshot> {
        let key = instance_key(node, vmid);
        self.instance_flights
            .run(&key, || async {
                let cached = self.node(node).await?;
                let kind = match cached.instance_kind(vmid).await {
                    Some(kind) => kind,
                    None => self.discover_kind(node, vmid).await?,
                };

                let registry = cached.registry().await;
                let storage = StorageIndex::default();
                match InstanceState::rebuild(&self.ctx, node, &registry, &storage, kind, vmid).await
                {
                    Ok(state) => {
                        cached.replace_instance(vmid, state).await;
                        info!(node, vmid, kind = %kind, "Instance rebuilt");
                        cached.instance(vmid).await
                    }
                    Err(e) => match self.discover_kind(node, vmid).await {
                        Err(gone) if gone.is_not_found() => {
                            cached.remove_instance(vmid).await;
                            Err(gone)
                        }
                        _ => Err(e),
                    },
                }
            })
            .await
    }

    /// Snapshot of one node, after any in-flight rebuild of it completes.
    pub async fn get_node(&self, name: &str) -> Result<NodeSnapshot> {
        self.node_flights.wait(name).await;
        Ok(self.node(name).await?.snapshot().await)
    }

    pub async fn get_node_devices(&self, name: &str) -> Result<BTreeMap<String, DeviceSnapshot>> {
        self.node_flights.wait(name).await;
        Ok(self.node(name).await?.devices().await)
    }

    /// Snapshot of one instance, after any in-flight rebuild of it or its
    /// node completes.
    pub async fn get_instance(&self, node: &str, vmid: u32) -> Result<InstanceSnapshot> {
        self.node_flights.wait(node).await;
        self.instance_flights.wait(&instance_key(node, vmid)).await;
        self.node(node).await?.instance(vmid).await
    }

    /// Names of the cached nodes, sorted.
    pub async fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Version reported by the upstream API.
    pub async fn source_version(&self) -> Result<VersionInfo> {
        self.ctx.call("version", |s| s.version()).await
    }

    async fn node(&self, name: &str) -> Result<Arc<NodeCache>> {
        self.nodes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(format!("node {name}")))
    }

    /// Work out whether `vmid` is a VM or a container from the node's
    /// guest listings.
    async fn discover_kind(&self, node: &str, vmid: u32) -> Result<InstanceType> {
        let vms = self
            .ctx
            .call(&format!("{node}/qemu"), |s| s.list_vms(node))
            .await?;
        if vms.contains(&vmid) {
            return Ok(InstanceType::Vm);
        }
        let cts = self
            .ctx
            .call(&format!("{node}/lxc"), |s| s.list_containers(node))
            .await?;
        if cts.contains(&vmid) {
            return Ok(InstanceType::Ct);
        }
        warn!(node, vmid, "Instance not listed on node");
        Err(CacheError::NotFound(format!("instance {vmid} on node {node}")))
    }
}

fn instance_key(node: &str, vmid: u32) -> String {
    format!("{node}/{vmid}")
}
