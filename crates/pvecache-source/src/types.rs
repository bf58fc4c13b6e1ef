//! Descriptors returned by an [`InventorySource`](crate::InventorySource).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

static DISK_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(ide|sata|scsi|virtio|unused|mp)\d+$").unwrap());
static NET_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^net\d+$").unwrap());
static HOSTPCI_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^hostpci\d+$").unwrap());

/// Upstream API version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub release: String,
}

/// Host identity and raw resource totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    pub cpus: u64,
    /// Bytes.
    pub memory_total: u64,
    /// Bytes.
    pub swap_total: u64,
}

/// One PCI function as listed by `/nodes/{node}/hardware/pci`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PciFunction {
    /// `<bus id>.<function>`, e.g. "0000:00:1f.3".
    pub id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub subsystem_device_name: String,
    #[serde(default)]
    pub subsystem_vendor_name: String,
}

/// One entry of a storage's content listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StorageContent {
    pub volid: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, deserialize_with = "de_u64")]
    pub size: u64,
}

/// Raw config fragments the resolvers need from a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmConfig {
    /// Configured disks merged with `unusedN` slots.
    pub disks: BTreeMap<String, String>,
    pub nets: BTreeMap<String, String>,
    pub hostpcis: BTreeMap<String, String>,
    pub boot: Option<String>,
}

/// Raw config fragments the resolvers need from a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    /// `rootfs`, `mpN`, and `unusedN` entries.
    pub disks: BTreeMap<String, String>,
    pub nets: BTreeMap<String, String>,
}

/// Rebuild input retained per instance, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceConfig {
    Vm(VmConfig),
    Container(ContainerConfig),
}

impl InstanceConfig {
    pub fn disks(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Vm(c) => &c.disks,
            Self::Container(c) => &c.disks,
        }
    }

    pub fn nets(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Vm(c) => &c.nets,
            Self::Container(c) => &c.nets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDescriptor {
    pub name: String,
    /// CPU model (`cpu` option), empty when unset.
    pub proc_type: String,
    pub cores: u64,
    pub memory_mib: u64,
    pub config: VmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub name: String,
    pub cores: u64,
    pub memory_mib: u64,
    pub swap_mib: u64,
    pub config: ContainerConfig,
}

impl VmDescriptor {
    /// Build from a `/qemu/{vmid}/config` object.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let mut disks = BTreeMap::new();
        let mut nets = BTreeMap::new();
        let mut hostpcis = BTreeMap::new();

        for (key, value) in config {
            let Some(value) = as_string(value) else {
                continue;
            };
            if DISK_KEY.is_match(key) && !key.starts_with("mp") {
                disks.insert(key.clone(), value);
            } else if NET_KEY.is_match(key) {
                nets.insert(key.clone(), value);
            } else if HOSTPCI_KEY.is_match(key) {
                hostpcis.insert(key.clone(), value);
            }
        }

        Self {
            name: str_field(config, "name"),
            proc_type: str_field(config, "cpu"),
            cores: u64_field(config, "cores").unwrap_or(1),
            memory_mib: u64_field(config, "memory").unwrap_or(512),
            config: VmConfig {
                disks,
                nets,
                hostpcis,
                boot: config.get("boot").and_then(as_string),
            },
        }
    }
}

impl ContainerDescriptor {
    /// Build from a `/lxc/{vmid}/config` object.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let mut disks = BTreeMap::new();
        let mut nets = BTreeMap::new();

        for (key, value) in config {
            let Some(value) = as_string(value) else {
                continue;
            };
            let is_ct_disk = key == "rootfs"
                || (DISK_KEY.is_match(key) && (key.starts_with("mp") || key.starts_with("unused")));
            if is_ct_disk {
                disks.insert(key.clone(), value);
            } else if NET_KEY.is_match(key) {
                nets.insert(key.clone(), value);
            }
        }

        Self {
            name: str_field(config, "hostname"),
            cores: u64_field(config, "cores").unwrap_or(1),
            memory_mib: u64_field(config, "memory").unwrap_or(512),
            swap_mib: u64_field(config, "swap").unwrap_or(512),
            config: ContainerConfig { disks, nets },
        }
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(config: &Map<String, Value>, key: &str) -> String {
    config.get(key).and_then(as_string).unwrap_or_default()
}

/// Numeric options arrive as numbers or numeric strings depending on the
/// PVE release.
pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn u64_field(config: &Map<String, Value>, key: &str) -> Option<u64> {
    config.get(key).and_then(as_u64)
}

pub(crate) fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    as_u64(&value).ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_vm_from_config() {
        let config = object(json!({
            "name": "db01",
            "cpu": "host",
            "cores": 4,
            "memory": "8192",
            "boot": "order=scsi0;net0",
            "scsi0": "local-lvm:vm-100-disk-0,iothread=1,size=32G",
            "scsihw": "virtio-scsi-single",
            "ide2": "none,media=cdrom",
            "unused0": "local-lvm:vm-100-disk-1",
            "net0": "virtio=BC:24:11:00:00:01,bridge=vmbr0,tag=20",
            "hostpci0": "0000:01:00,pcie=1",
            "efidisk0": "local-lvm:vm-100-disk-2,size=4M",
            "digest": "abc"
        }));

        let vm = VmDescriptor::from_config(&config);
        assert_eq!(vm.name, "db01");
        assert_eq!(vm.proc_type, "host");
        assert_eq!(vm.cores, 4);
        assert_eq!(vm.memory_mib, 8192);
        assert_eq!(
            vm.config.disks.keys().collect::<Vec<_>>(),
            vec!["ide2", "scsi0", "unused0"]
        );
        assert_eq!(vm.config.nets.len(), 1);
        assert_eq!(vm.config.hostpcis["hostpci0"], "0000:01:00,pcie=1");
        assert_eq!(vm.config.boot.as_deref(), Some("order=scsi0;net0"));
    }

    #[test]
    fn test_vm_defaults() {
        let vm = VmDescriptor::from_config(&Map::new());
        assert_eq!(vm.cores, 1);
        assert_eq!(vm.memory_mib, 512);
        assert_eq!(vm.proc_type, "");
        assert!(vm.config.boot.is_none());
    }

    #[test]
    fn test_container_from_config() {
        let config = object(json!({
            "hostname": "web",
            "cores": 2,
            "memory": 1024,
            "swap": 256,
            "rootfs": "local-lvm:vm-101-disk-0,size=8G",
            "mp0": "local-lvm:vm-101-disk-1,mp=/data,size=16G",
            "unused0": "local-lvm:vm-101-disk-2",
            "mpX": "ignored",
            "net0": "name=eth0,bridge=vmbr0,ip=dhcp,rate=10"
        }));

        let ct = ContainerDescriptor::from_config(&config);
        assert_eq!(ct.name, "web");
        assert_eq!(ct.swap_mib, 256);
        assert_eq!(
            ct.config.disks.keys().collect::<Vec<_>>(),
            vec!["mp0", "rootfs", "unused0"]
        );
        assert_eq!(ct.config.nets.len(), 1);
    }

    #[test]
    fn test_instance_config_accessors() {
        let mut ct = ContainerConfig::default();
        ct.disks.insert("rootfs".into(), "local:subvol-101-disk-0".into());
        let config = InstanceConfig::Container(ct);
        assert_eq!(config.disks().len(), 1);
        assert!(config.nets().is_empty());
    }

    #[test]
    fn test_storage_content_string_size() {
        let entry: StorageContent = serde_json::from_value(json!({
            "volid": "local:iso/debian.iso",
            "format": "iso",
            "size": "1048576"
        }))
        .unwrap();
        assert_eq!(entry.size, 1048576);
    }
}
