//! Node cache: host resources, its device registry, and its instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use pvecache_core::error::{CacheError, Result};
use pvecache_core::model::{DeviceSnapshot, InstanceSnapshot, InstanceType, NodeSnapshot};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::{RebuildContext, StorageIndex};
use crate::instance::{InstanceCache, InstanceState};
use crate::registry::DeviceRegistry;
use crate::report::{InstanceFailure, NodeRebuildReport};

#[derive(Debug)]
pub(crate) struct NodeState {
    cores: u64,
    memory: u64,
    swap: u64,
    registry: DeviceRegistry,
    instances: BTreeMap<u32, Arc<InstanceCache>>,
}

impl NodeState {
    /// Fetch the node, its PCI functions, and every instance on it.
    ///
    /// Node and listing fetches are fatal. Instance failures are collected
    /// into the report and the instance is left out. Instances are fetched
    /// concurrently, at most `instance_concurrency` at a time.
    pub(crate) async fn rebuild(
        ctx: &Arc<RebuildContext>,
        name: &str,
    ) -> Result<(Self, NodeRebuildReport)> {
        let descriptor = ctx.call(name, |s| s.get_node(name)).await?;
        let pci = ctx
            .call(&format!("{name}/hardware/pci"), |s| s.list_pci_devices(name))
            .await?;
        let vmids = ctx.call(&format!("{name}/qemu"), |s| s.list_vms(name)).await?;
        let ctids = ctx
            .call(&format!("{name}/lxc"), |s| s.list_containers(name))
            .await?;

        let registry = Arc::new(DeviceRegistry::build(&pci));
        let storage = Arc::new(StorageIndex::default());
        let permits = Arc::new(Semaphore::new(ctx.options.instance_concurrency.max(1)));

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        let guests = vmids
            .into_iter()
            .map(|id| (InstanceType::Vm, id))
            .chain(ctids.into_iter().map(|id| (InstanceType::Ct, id)));
        for (kind, vmid) in guests {
            let ctx = Arc::clone(ctx);
            let registry = Arc::clone(&registry);
            let storage = Arc::clone(&storage);
            let permits = Arc::clone(&permits);
            let node = name.to_string();
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                InstanceState::rebuild(&ctx, &node, &registry, &storage, kind, vmid).await
            });
            pending.insert(handle.id(), (kind, vmid));
        }

        let mut states: BTreeMap<u32, InstanceState> = BTreeMap::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    let id = e.id();
                    (id, Err(CacheError::upstream(name, format!("rebuild task failed: {e}"))))
                }
            };
            let Some((kind, vmid)) = pending.remove(&id) else {
                continue;
            };
            match outcome {
                Ok(state) => {
                    if states.insert(vmid, state).is_some() {
                        warn!(node = %name, vmid, "Duplicate instance id, keeping the last one");
                    }
                }
                Err(e) => {
                    error!(node = %name, vmid, kind = %kind, error = %e, "Instance rebuild failed");
                    failures.push(InstanceFailure {
                        kind,
                        vmid,
                        error: e.to_string(),
                    });
                }
            }
        }
        failures.sort_by_key(|f| f.vmid);

        let mut registry = Arc::try_unwrap(registry).unwrap_or_else(|shared| (*shared).clone());
        registry.recompute_reservations(states.values().flat_map(InstanceState::bound_bus_ids));

        let report = NodeRebuildReport {
            node: name.to_string(),
            instances: states.len(),
            devices: registry.len(),
            failures,
        };
        let instances = states
            .into_iter()
            .map(|(vmid, state)| (vmid, Arc::new(InstanceCache::new(state))))
            .collect();

        Ok((
            Self {
                cores: descriptor.cpus,
                memory: descriptor.memory_total,
                swap: descriptor.swap_total,
                registry,
                instances,
            },
            report,
        ))
    }
}

/// One host in the cluster. Its state is replaced wholesale on a node
/// rebuild; a single instance may be swapped in by an instance rebuild.
#[derive(Debug)]
pub struct NodeCache {
    name: String,
    state: RwLock<NodeState>,
}

impl NodeCache {
    pub(crate) fn new(name: &str, state: NodeState) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(state),
        }
    }

    /// Copy the whole node out. Instances are read under their own locks
    /// while the node read lock is held.
    pub async fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.read().await;
        let mut instances = BTreeMap::new();
        for (vmid, instance) in &state.instances {
            instances.insert(*vmid, instance.snapshot(&state.registry).await);
        }
        NodeSnapshot {
            name: self.name.clone(),
            cores: state.cores,
            memory: state.memory,
            swap: state.swap,
            devices: state.registry.snapshot(),
            instances,
        }
    }

    pub(crate) async fn replace(&self, state: NodeState) {
        *self.state.write().await = state;
    }

    pub async fn devices(&self) -> BTreeMap<String, DeviceSnapshot> {
        self.state.read().await.registry.snapshot()
    }

    pub async fn instance(&self, vmid: u32) -> Result<InstanceSnapshot> {
        let state = self.state.read().await;
        let instance = state
            .instances
            .get(&vmid)
            .ok_or_else(|| CacheError::NotFound(format!("instance {vmid} on node {}", self.name)))?;
        Ok(instance.snapshot(&state.registry).await)
    }

    /// Kind of a cached instance, if present.
    pub(crate) async fn instance_kind(&self, vmid: u32) -> Option<InstanceType> {
        let instance = self.state.read().await.instances.get(&vmid).cloned()?;
        Some(instance.kind().await)
    }

    /// The registry to resolve a single-instance rebuild against.
    pub(crate) async fn registry(&self) -> DeviceRegistry {
        self.state.read().await.registry.clone()
    }

    /// Swap one instance in (or add it), then rederive reservations from
    /// every instance's bindings.
    pub(crate) async fn replace_instance(&self, vmid: u32, fresh: InstanceState) {
        let mut state = self.state.write().await;
        let existing = state.instances.get(&vmid).cloned();
        match existing {
            Some(existing) if existing.kind().await == fresh.kind() => {
                existing.replace(fresh).await;
            }
            _ => {
                state
                    .instances
                    .insert(vmid, Arc::new(InstanceCache::new(fresh)));
            }
        }

        let mut claimed = Vec::new();
        for instance in state.instances.values() {
            claimed.extend(instance.bound_bus_ids().await);
        }
        state
            .registry
            .recompute_reservations(claimed.iter().map(String::as_str));
        debug!(node = %self.name, vmid, "Instance replaced");
    }

    /// Drop an instance the source no longer reports.
    pub(crate) async fn remove_instance(&self, vmid: u32) {
        let mut state = self.state.write().await;
        if state.instances.remove(&vmid).is_none() {
            return;
        }
        let mut claimed = Vec::new();
        for instance in state.instances.values() {
            claimed.extend(instance.bound_bus_ids().await);
        }
        state
            .registry
            .recompute_reservations(claimed.iter().map(String::as_str));
        info!(node = %self.name, vmid, "Instance removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fast_options, fixture_node, fixture_source};
    use pvecache_core::MIB;
    use pvecache_source::mock::{MockSource, vm};
    use std::time::Duration;

    async fn rebuild(source: MockSource) -> Result<(NodeCache, NodeRebuildReport)> {
        let ctx = Arc::new(RebuildContext::new(Arc::new(source), fast_options()));
        let (state, report) = NodeState::rebuild(&ctx, "pve1").await?;
        Ok((NodeCache::new("pve1", state), report))
    }

    fn assert_reserved_is_or(devices: &BTreeMap<String, DeviceSnapshot>) {
        for device in devices.values() {
            assert_eq!(
                device.reserved,
                device.functions.values().any(|f| f.reserved),
                "device {}",
                device.bus_id
            );
        }
    }

    #[tokio::test]
    async fn test_rebuild_populates_node() {
        let (node, report) = rebuild(fixture_source()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.instances, 3);
        assert_eq!(report.devices, 2);

        let snap = node.snapshot().await;
        assert_eq!(snap.name, "pve1");
        assert_eq!(snap.cores, 16);
        assert_eq!(snap.memory, 64 * 1024 * MIB);
        assert_eq!(snap.instances.keys().copied().collect::<Vec<_>>(), vec![100, 101, 200]);
        assert_eq!(snap.instances[&200].kind, InstanceType::Ct);
    }

    #[tokio::test]
    async fn test_super_device_reserves_every_function() {
        let (node, _) = rebuild(fixture_source()).await.unwrap();
        let devices = node.devices().await;

        let nic = &devices["0000:00:05"];
        assert!(nic.reserved);
        assert!(nic.functions.values().all(|f| f.reserved));

        let bound = &node.instance(100).await.unwrap().devices["hostpci0"];
        assert_eq!(bound.functions.len(), nic.functions.len());
        assert!(bound.reserved);
    }

    #[tokio::test]
    async fn test_function_assignment_reserves_nothing() {
        let (node, _) = rebuild(fixture_source()).await.unwrap();
        let gpu = &node.devices().await["0000:01:00"];
        assert!(!gpu.reserved);
        assert!(gpu.functions.values().all(|f| !f.reserved));
        assert!(node.instance(101).await.unwrap().devices.is_empty());
        assert_reserved_is_or(&node.devices().await);
    }

    #[tokio::test]
    async fn test_instance_failures_do_not_block_siblings() {
        let source = fixture_source();
        source.fail("get_container:pve1:200");
        source.fail("get_vm:pve1:100");

        let (node, report) = rebuild(source).await.unwrap();
        assert_eq!(report.instances, 1);
        let failed: Vec<_> = report.failures.iter().map(|f| (f.kind, f.vmid)).collect();
        assert_eq!(failed, vec![(InstanceType::Vm, 100), (InstanceType::Ct, 200)]);

        let snap = node.snapshot().await;
        assert_eq!(snap.instances.keys().copied().collect::<Vec<_>>(), vec![101]);
        assert!(!snap.devices["0000:00:05"].reserved);
    }

    #[tokio::test]
    async fn test_node_fetch_failure_is_fatal() {
        let source = fixture_source();
        source.fail("list_pci_devices:pve1");
        let err = rebuild(source).await.unwrap_err();
        assert!(matches!(err, CacheError::UpstreamUnreachable { .. }));
        assert!(err.to_string().contains("possibly down"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut node = fixture_node();
        for vmid in 300..310 {
            node.vms.insert(vmid, vm("bulk", &[], &[], &[], None));
        }
        let source = Arc::new(MockSource::new().with_node("pve1", node));
        for vmid in 300..310 {
            source.delay(&format!("get_vm:pve1:{vmid}"), Duration::from_millis(40));
        }
        let options = crate::context::CacheOptions {
            instance_concurrency: 2,
            ..fast_options()
        };
        let ctx = Arc::new(RebuildContext::new(source, options));

        let started = tokio::time::Instant::now();
        let (_, report) = NodeState::rebuild(&ctx, "pve1").await.unwrap();
        assert_eq!(report.instances, 13);
        // ten 40ms fetches, two at a time
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_replace_instance_rederives_reservations() {
        let source = fixture_source();
        let (node, _) = rebuild(source).await.unwrap();
        assert!(node.devices().await["0000:00:05"].reserved);

        let registry = node.registry().await;
        let mut unbound = vm("db01", &[], &[], &[], None);
        unbound.config.hostpcis.clear();
        let updated = MockSource::new().with_node("pve1", {
            let mut n = fixture_node();
            n.vms.insert(100, unbound);
            n
        });
        let ctx = RebuildContext::new(Arc::new(updated), fast_options());
        let fresh = InstanceState::rebuild(
            &ctx,
            "pve1",
            &registry,
            &StorageIndex::default(),
            InstanceType::Vm,
            100,
        )
        .await
        .unwrap();
        node.replace_instance(100, fresh).await;

        let devices = node.devices().await;
        assert!(!devices["0000:00:05"].reserved);
        assert_reserved_is_or(&devices);
    }

    #[tokio::test]
    async fn test_missing_instance_is_not_found() {
        let (node, _) = rebuild(fixture_source()).await.unwrap();
        assert!(node.instance(555).await.unwrap_err().is_not_found());

        node.remove_instance(100).await;
        assert!(node.instance(100).await.unwrap_err().is_not_found());
        assert!(!node.devices().await["0000:00:05"].reserved);
    }
}
