//! Proxmox VE REST client.

use async_trait::async_trait;
use pvecache_core::config::PveSettings;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::InventorySource;
use crate::error::SourceError;
use crate::types::{
    ContainerDescriptor, NodeDescriptor, PciFunction, StorageContent, VersionInfo, VmDescriptor,
    as_u64, de_u64,
};

/// Every PVE response wraps its payload in `{"data": ...}`.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct NodeListEntry {
    node: String,
}

#[derive(Deserialize)]
struct GuestListEntry {
    #[serde(deserialize_with = "de_u64")]
    vmid: u64,
}

/// API-token authenticated client for `/api2/json`.
#[derive(Clone)]
pub struct PveClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl PveClient {
    pub fn new(settings: &PveSettings) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pvecache/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout())
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            auth_header: format!(
                "PVEAPIToken={}@{}!{}={}",
                settings.user, settings.realm, settings.token_id, settings.token_secret
            ),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "PVE request");

        let resp = self
            .http
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<T> = resp.json().await.map_err(|e| SourceError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(envelope.data)
    }

    async fn guest_ids(&self, path: &str) -> Result<Vec<u32>, SourceError> {
        let guests: Vec<GuestListEntry> = self.get(path).await?;
        guests
            .into_iter()
            .map(|g| {
                u32::try_from(g.vmid).map_err(|_| SourceError::Decode {
                    path: path.to_string(),
                    reason: format!("vmid {} out of range", g.vmid),
                })
            })
            .collect()
    }
}

#[async_trait]
impl InventorySource for PveClient {
    async fn version(&self) -> Result<VersionInfo, SourceError> {
        self.get("/version").await
    }

    async fn list_nodes(&self) -> Result<Vec<String>, SourceError> {
        let nodes: Vec<NodeListEntry> = self.get("/nodes").await?;
        Ok(nodes.into_iter().map(|n| n.node).collect())
    }

    async fn get_node(&self, node: &str) -> Result<NodeDescriptor, SourceError> {
        let path = format!("/nodes/{node}/status");
        let status: Value = self.get(&path).await?;
        let cpus = status
            .pointer("/cpuinfo/cpus")
            .and_then(as_u64)
            .ok_or_else(|| SourceError::Decode {
                path: path.clone(),
                reason: "missing cpuinfo.cpus".to_string(),
            })?;

        Ok(NodeDescriptor {
            name: node.to_string(),
            cpus,
            memory_total: status.pointer("/memory/total").and_then(as_u64).unwrap_or(0),
            swap_total: status.pointer("/swap/total").and_then(as_u64).unwrap_or(0),
        })
    }

    async fn list_pci_devices(&self, node: &str) -> Result<Vec<PciFunction>, SourceError> {
        self.get(&format!("/nodes/{node}/hardware/pci")).await
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<u32>, SourceError> {
        self.guest_ids(&format!("/nodes/{node}/qemu")).await
    }

    async fn list_containers(&self, node: &str) -> Result<Vec<u32>, SourceError> {
        self.guest_ids(&format!("/nodes/{node}/lxc")).await
    }

    async fn get_vm(&self, node: &str, vmid: u32) -> Result<VmDescriptor, SourceError> {
        let config: Map<String, Value> =
            self.get(&format!("/nodes/{node}/qemu/{vmid}/config")).await?;
        Ok(VmDescriptor::from_config(&config))
    }

    async fn get_container(
        &self,
        node: &str,
        vmid: u32,
    ) -> Result<ContainerDescriptor, SourceError> {
        let config: Map<String, Value> =
            self.get(&format!("/nodes/{node}/lxc/{vmid}/config")).await?;
        Ok(ContainerDescriptor::from_config(&config))
    }

    async fn get_storage_content(
        &self,
        node: &str,
        storage: &str,
    ) -> Result<Vec<StorageContent>, SourceError> {
        self.get(&format!("/nodes/{node}/storage/{storage}/content"))
            .await
    }
}
