//! Instance cache: one VM or container and its resolved resources.

use std::collections::BTreeMap;

use pvecache_core::MIB;
use pvecache_core::boot;
use pvecache_core::error::{CacheError, Result};
use pvecache_core::model::{BootOrder, InstanceSnapshot, InstanceType, Net, Volume};
use pvecache_core::net;
use pvecache_core::pci::{self, PciTarget};
use pvecache_core::volume::{self, VolumeRef};
use pvecache_source::{ContainerDescriptor, InstanceConfig, VmDescriptor};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::context::{RebuildContext, StorageIndex};
use crate::registry::DeviceRegistry;

/// Structured state of one instance. Replaced wholesale on rebuild.
#[derive(Debug, Clone)]
pub(crate) struct InstanceState {
    kind: InstanceType,
    vmid: u32,
    name: String,
    proctype: Option<String>,
    cores: u64,
    memory: u64,
    swap: u64,
    volumes: BTreeMap<String, Volume>,
    nets: BTreeMap<String, Net>,
    /// `hostpciN` -> bus id in the owning node's registry.
    devices: BTreeMap<String, String>,
    boot: Option<BootOrder>,
    /// Raw config retained as rebuild input.
    config: InstanceConfig,
}

/// Lock-guarded instance entry owned by a node.
#[derive(Debug)]
pub struct InstanceCache {
    state: RwLock<InstanceState>,
}

impl InstanceCache {
    pub(crate) fn new(state: InstanceState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub(crate) async fn replace(&self, state: InstanceState) {
        *self.state.write().await = state;
    }

    pub(crate) async fn kind(&self) -> InstanceType {
        self.state.read().await.kind
    }

    pub(crate) async fn bound_bus_ids(&self) -> Vec<String> {
        self.state.read().await.devices.values().cloned().collect()
    }

    /// Copy the instance out, resolving device bindings against `registry`.
    pub(crate) async fn snapshot(&self, registry: &DeviceRegistry) -> InstanceSnapshot {
        self.state.read().await.snapshot(registry)
    }
}

impl InstanceState {
    fn from_vm(vmid: u32, vm: VmDescriptor) -> Self {
        Self {
            kind: InstanceType::Vm,
            vmid,
            name: vm.name,
            proctype: Some(vm.proc_type),
            cores: vm.cores,
            memory: vm.memory_mib.saturating_mul(MIB),
            swap: 0,
            volumes: BTreeMap::new(),
            nets: BTreeMap::new(),
            devices: BTreeMap::new(),
            boot: None,
            config: InstanceConfig::Vm(vm.config),
        }
    }

    fn from_container(vmid: u32, ct: ContainerDescriptor) -> Self {
        Self {
            kind: InstanceType::Ct,
            vmid,
            name: ct.name,
            proctype: None,
            cores: ct.cores,
            memory: ct.memory_mib.saturating_mul(MIB),
            swap: ct.swap_mib.saturating_mul(MIB),
            volumes: BTreeMap::new(),
            nets: BTreeMap::new(),
            devices: BTreeMap::new(),
            boot: None,
            config: InstanceConfig::Container(ct.config),
        }
    }

    /// Fetch an instance descriptor and resolve its volumes, nets, PCI
    /// bindings, and (VMs only) boot order.
    ///
    /// Volume and net failures are best-effort: logged, entry left absent.
    /// A PCI binding whose key is missing from the raw config aborts.
    pub(crate) async fn rebuild(
        ctx: &RebuildContext,
        node: &str,
        registry: &DeviceRegistry,
        storage: &StorageIndex,
        kind: InstanceType,
        vmid: u32,
    ) -> Result<Self> {
        let target = format!("{node}/{vmid}");
        let mut state = match kind {
            InstanceType::Vm => {
                let vm = ctx.call(&target, |s| s.get_vm(node, vmid)).await?;
                Self::from_vm(vmid, vm)
            }
            InstanceType::Ct => {
                let ct = ctx.call(&target, |s| s.get_container(node, vmid)).await?;
                Self::from_container(vmid, ct)
            }
        };

        let disk_ids: Vec<String> = state.config.disks().keys().cloned().collect();
        for vol_id in &disk_ids {
            if let Err(e) = state.rebuild_volume(ctx, storage, node, vol_id).await {
                warn!(node, vmid, volume = %vol_id, error = %e, "Skipping volume");
            }
        }

        let net_ids: Vec<String> = state.config.nets().keys().cloned().collect();
        for net_id in &net_ids {
            if let Err(e) = state.rebuild_net(net_id) {
                warn!(node, vmid, net = %net_id, error = %e, "Skipping net");
            }
        }

        if let InstanceConfig::Vm(vm) = &state.config {
            let device_ids: Vec<String> = vm.hostpcis.keys().cloned().collect();
            for device_id in &device_ids {
                state.rebuild_device(registry, device_id)?;
            }
            state.rebuild_boot();
        }

        Ok(state)
    }

    /// Resolve one disk entry against the node's storage listing. A listing
    /// that cannot be fetched leaves format and size zeroed.
    pub(crate) async fn rebuild_volume(
        &mut self,
        ctx: &RebuildContext,
        storage: &StorageIndex,
        node: &str,
        vol_id: &str,
    ) -> Result<()> {
        let descriptor = self
            .config
            .disks()
            .get(vol_id)
            .ok_or_else(|| CacheError::NotFound(format!("{vol_id} in disks")))?;
        let kind = volume::classify(vol_id)?;
        let volume_ref = VolumeRef::parse(descriptor)?;

        let listing = storage.content(ctx, node, &volume_ref.storage).await;
        let entry = listing
            .as_deref()
            .and_then(|content| content.iter().find(|c| c.volid == volume_ref.volid));

        let resolved = volume::build(
            kind,
            &volume_ref,
            entry.map(|c| (c.format.as_str(), c.size)),
        );
        self.volumes.insert(vol_id.to_string(), resolved);
        Ok(())
    }

    pub(crate) fn rebuild_net(&mut self, net_id: &str) -> Result<()> {
        let raw = self
            .config
            .nets()
            .get(net_id)
            .ok_or_else(|| CacheError::NotFound(format!("{net_id} in nets")))?;
        let parsed = net::parse(raw)?;
        self.nets.insert(net_id.to_string(), parsed);
        Ok(())
    }

    /// Bind a `hostpciN` assignment to a registry device.
    ///
    /// Only whole-device assignments bind. Function-level assignments are
    /// not supported and leave no binding.
    pub(crate) fn rebuild_device(&mut self, registry: &DeviceRegistry, device_id: &str) -> Result<()> {
        let descriptor = match &self.config {
            InstanceConfig::Vm(vm) => vm.hostpcis.get(device_id),
            InstanceConfig::Container(_) => None,
        }
        .ok_or_else(|| CacheError::NotFound(format!("{device_id} in devices")))?;

        match pci::parse_assignment(descriptor) {
            Ok(PciTarget::Device(bus_id)) if registry.contains(&bus_id) => {
                self.devices.insert(device_id.to_string(), bus_id);
            }
            Ok(PciTarget::Device(bus_id)) => {
                warn!(vmid = self.vmid, device = %device_id, bus_id = %bus_id, "Assigned device not present on node");
            }
            Ok(PciTarget::Function { bus_id, function }) => {
                let e = CacheError::Unsupported(format!("sub-function assignment {bus_id}.{function}"));
                debug!(vmid = self.vmid, device = %device_id, error = %e, "Leaving device unbound");
            }
            Err(e @ CacheError::Unsupported(_)) => {
                debug!(vmid = self.vmid, device = %device_id, error = %e, "Leaving device unbound");
            }
            Err(e) => {
                warn!(vmid = self.vmid, device = %device_id, error = %e, "Skipping device");
            }
        }
        Ok(())
    }

    /// Split bootable volumes and all nets into enabled (configured order)
    /// and disabled (sorted) targets.
    pub(crate) fn rebuild_boot(&mut self) {
        let InstanceConfig::Vm(vm) = &self.config else {
            return;
        };

        let eligible = self
            .volumes
            .iter()
            .filter(|(_, v)| v.kind.is_bootable())
            .map(|(id, _)| id.clone())
            .chain(self.nets.keys().cloned());

        let order = match vm.boot.as_deref().map(boot::parse_order).transpose() {
            Ok(order) => order.unwrap_or_default(),
            Err(e) => {
                warn!(vmid = self.vmid, error = %e, "Ignoring boot order");
                Vec::new()
            }
        };

        self.boot = Some(boot::resolve(eligible, &order));
    }

    pub(crate) fn kind(&self) -> InstanceType {
        self.kind
    }

    pub(crate) fn bound_bus_ids(&self) -> impl Iterator<Item = &str> {
        self.devices.values().map(String::as_str)
    }

    fn snapshot(&self, registry: &DeviceRegistry) -> InstanceSnapshot {
        InstanceSnapshot {
            kind: self.kind,
            vmid: self.vmid,
            name: self.name.clone(),
            proctype: self.proctype.clone(),
            cores: self.cores,
            memory: self.memory,
            swap: self.swap,
            volumes: self.volumes.clone(),
            nets: self.nets.clone(),
            devices: self
                .devices
                .iter()
                .filter_map(|(id, bus_id)| registry.device(bus_id).map(|d| (id.clone(), d)))
                .collect(),
            boot: self.boot.clone(),
        }
    }
}
