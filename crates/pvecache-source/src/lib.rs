// pvecache-source: Inventory source seam and the Proxmox VE client
// Depends on pvecache-core (connection settings)

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pve;
pub mod types;

pub use error::SourceError;
pub use pve::PveClient;
pub use types::{
    ContainerConfig, ContainerDescriptor, InstanceConfig, NodeDescriptor, PciFunction,
    StorageContent, VersionInfo, VmConfig, VmDescriptor,
};

use async_trait::async_trait;

/// Read access to a virtualization cluster's inventory.
///
/// Implementations must be safe to call from many rebuild tasks at once.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn version(&self) -> Result<VersionInfo, SourceError>;

    async fn list_nodes(&self) -> Result<Vec<String>, SourceError>;

    async fn get_node(&self, node: &str) -> Result<NodeDescriptor, SourceError>;

    async fn list_pci_devices(&self, node: &str) -> Result<Vec<PciFunction>, SourceError>;

    async fn list_vms(&self, node: &str) -> Result<Vec<u32>, SourceError>;

    async fn list_containers(&self, node: &str) -> Result<Vec<u32>, SourceError>;

    async fn get_vm(&self, node: &str, vmid: u32) -> Result<VmDescriptor, SourceError>;

    async fn get_container(&self, node: &str, vmid: u32)
    -> Result<ContainerDescriptor, SourceError>;

    async fn get_storage_content(
        &self,
        node: &str,
        storage: &str,
    ) -> Result<Vec<StorageContent>, SourceError>;
}
