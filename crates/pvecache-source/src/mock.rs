//! In-memory [`InventorySource`] for tests.
//!
//! Calls are keyed as `method:node[:arg]` (e.g. `get_vm:pve1:100`,
//! `list_nodes`). Any key can be made to fail, and every call is counted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::InventorySource;
use crate::error::SourceError;
use crate::types::{
    ContainerConfig, ContainerDescriptor, NodeDescriptor, PciFunction, StorageContent,
    VersionInfo, VmConfig, VmDescriptor,
};

#[derive(Debug, Clone, Default)]
pub struct MockNode {
    pub cpus: u64,
    pub memory_total: u64,
    pub swap_total: u64,
    pub pci: Vec<PciFunction>,
    pub vms: BTreeMap<u32, VmDescriptor>,
    pub containers: BTreeMap<u32, ContainerDescriptor>,
    pub storage: BTreeMap<String, Vec<StorageContent>>,
}

#[derive(Default)]
struct MockState {
    nodes: BTreeMap<String, MockNode>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MockSource {
    state: Mutex<MockState>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, name: &str, node: MockNode) -> Self {
        self.put_node(name, node);
        self
    }

    /// Insert or replace a node.
    pub fn put_node(&self, name: &str, node: MockNode) {
        self.state().nodes.insert(name.to_string(), node);
    }

    pub fn remove_node(&self, name: &str) {
        self.state().nodes.remove(name);
    }

    /// Mutate a node in place (e.g. change a VM's config between rebuilds).
    pub fn update_node<F: FnOnce(&mut MockNode)>(&self, name: &str, f: F) {
        if let Some(node) = self.state().nodes.get_mut(name) {
            f(node);
        }
    }

    /// Make calls matching `key` fail until [`heal`](Self::heal)ed.
    pub fn fail(&self, key: &str) {
        self.state().failing.insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.state().failing.remove(key);
    }

    /// Delay calls matching `key` before they answer.
    pub fn delay(&self, key: &str, delay: Duration) {
        self.state().delays.insert(key.to_string(), delay);
    }

    /// Number of calls made for `key`.
    pub fn calls(&self, key: &str) -> usize {
        self.state().calls.get(key).copied().unwrap_or(0)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, key: String) -> Result<(), SourceError> {
        let delay = {
            let mut state = self.state();
            *state.calls.entry(key.clone()).or_default() += 1;
            state.delays.get(&key).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state().failing.contains(&key) {
            return Err(SourceError::Unavailable(format!("{key}: injected failure")));
        }
        Ok(())
    }

    fn with_mock_node<T>(
        &self,
        node: &str,
        f: impl FnOnce(&MockNode) -> Option<T>,
    ) -> Result<T, SourceError> {
        let state = self.state();
        state
            .nodes
            .get(node)
            .and_then(f)
            .ok_or_else(|| SourceError::Unavailable(format!("no such resource on {node}")))
    }
}

#[async_trait]
impl InventorySource for MockSource {
    async fn version(&self) -> Result<VersionInfo, SourceError> {
        self.enter("version".to_string()).await?;
        Ok(VersionInfo {
            version: "8.2.4".to_string(),
            release: "8.2".to_string(),
        })
    }

    async fn list_nodes(&self) -> Result<Vec<String>, SourceError> {
        self.enter("list_nodes".to_string()).await?;
        Ok(self.state().nodes.keys().cloned().collect())
    }

    async fn get_node(&self, node: &str) -> Result<NodeDescriptor, SourceError> {
        self.enter(format!("get_node:{node}")).await?;
        self.with_mock_node(node, |n| {
            Some(NodeDescriptor {
                name: node.to_string(),
                cpus: n.cpus,
                memory_total: n.memory_total,
                swap_total: n.swap_total,
            })
        })
    }

    async fn list_pci_devices(&self, node: &str) -> Result<Vec<PciFunction>, SourceError> {
        self.enter(format!("list_pci_devices:{node}")).await?;
        self.with_mock_node(node, |n| Some(n.pci.clone()))
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<u32>, SourceError> {
        self.enter(format!("list_vms:{node}")).await?;
        self.with_mock_node(node, |n| Some(n.vms.keys().copied().collect()))
    }

    async fn list_containers(&self, node: &str) -> Result<Vec<u32>, SourceError> {
        self.enter(format!("list_containers:{node}")).await?;
        self.with_mock_node(node, |n| Some(n.containers.keys().copied().collect()))
    }

    async fn get_vm(&self, node: &str, vmid: u32) -> Result<VmDescriptor, SourceError> {
        self.enter(format!("get_vm:{node}:{vmid}")).await?;
        self.with_mock_node(node, |n| n.vms.get(&vmid).cloned())
    }

    async fn get_container(
        &self,
        node: &str,
        vmid: u32,
    ) -> Result<ContainerDescriptor, SourceError> {
        self.enter(format!("get_container:{node}:{vmid}")).await?;
        self.with_mock_node(node, |n| n.containers.get(&vmid).cloned())
    }

    async fn get_storage_content(
        &self,
        node: &str,
        storage: &str,
    ) -> Result<Vec<StorageContent>, SourceError> {
        self.enter(format!("get_storage_content:{node}:{storage}"))
            .await?;
        self.with_mock_node(node, |n| n.storage.get(storage).cloned())
    }
}

/// A VM descriptor with the given disks, nets, PCI assignments, and boot string.
pub fn vm(
    name: &str,
    disks: &[(&str, &str)],
    nets: &[(&str, &str)],
    hostpcis: &[(&str, &str)],
    boot: Option<&str>,
) -> VmDescriptor {
    VmDescriptor {
        name: name.to_string(),
        proc_type: "host".to_string(),
        cores: 2,
        memory_mib: 2048,
        config: VmConfig {
            disks: to_map(disks),
            nets: to_map(nets),
            hostpcis: to_map(hostpcis),
            boot: boot.map(str::to_string),
        },
    }
}

/// A container descriptor with the given disks and nets.
pub fn container(name: &str, disks: &[(&str, &str)], nets: &[(&str, &str)]) -> ContainerDescriptor {
    ContainerDescriptor {
        name: name.to_string(),
        cores: 1,
        memory_mib: 512,
        swap_mib: 256,
        config: ContainerConfig {
            disks: to_map(disks),
            nets: to_map(nets),
        },
    }
}

/// PCI functions `<bus_id>.<f>` for each suffix in `functions`.
pub fn pci_device(bus_id: &str, name: &str, functions: &[&str]) -> Vec<PciFunction> {
    functions
        .iter()
        .map(|f| PciFunction {
            id: format!("{bus_id}.{f}"),
            device_name: format!("{name} function {f}"),
            vendor_name: "Acme".to_string(),
            ..PciFunction::default()
        })
        .collect()
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
