//! Read-side snapshot types.
//!
//! Everything handed out by the cache is one of these owned values, copied
//! out while the owning lock was held. Field names are the stable JSON shape
//! of the read surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Instance kind: QEMU virtual machine or LXC container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceType {
    #[serde(rename = "VM")]
    Vm,
    #[serde(rename = "CT")]
    Ct,
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vm => write!(f, "VM"),
            Self::Ct => write!(f, "CT"),
        }
    }
}

/// Volume classification, derived from the disk's config key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    Sata,
    Scsi,
    Ide,
    Virtio,
    Rootfs,
    Mp,
    Unused,
}

impl VolumeType {
    /// Ordered prefix table; first match wins.
    pub const PREFIXES: [(&'static str, VolumeType); 7] = [
        ("sata", VolumeType::Sata),
        ("scsi", VolumeType::Scsi),
        ("ide", VolumeType::Ide),
        ("virtio", VolumeType::Virtio),
        ("rootfs", VolumeType::Rootfs),
        ("mp", VolumeType::Mp),
        ("unused", VolumeType::Unused),
    ];

    /// Classify a disk by its config key (`scsi0`, `rootfs`, `unused1`, ...).
    pub fn classify(key: &str) -> Option<Self> {
        Self::PREFIXES
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    /// Whether a VM can boot from a volume of this type.
    pub fn is_bootable(self) -> bool {
        matches!(self, Self::Sata | Self::Scsi | Self::Ide | Self::Virtio)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(rename = "type")]
    pub kind: VolumeType,
    pub storage: String,
    pub format: String,
    /// Size in bytes.
    pub size: u64,
    pub volid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    /// The config string exactly as the source reported it.
    pub raw: String,
    pub rate: u64,
    pub vlan: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootOrder {
    /// Boot targets in configured order.
    pub enabled: Vec<String>,
    /// Remaining eligible targets, sorted by id.
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSnapshot {
    pub id: String,
    pub device_name: String,
    pub vendor_name: String,
    pub subsystem_device_name: String,
    pub subsystem_vendor_name: String,
    pub reserved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub bus_id: String,
    pub device_name: String,
    pub vendor_name: String,
    pub functions: BTreeMap<String, FunctionSnapshot>,
    pub reserved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub vmid: u32,
    pub name: String,
    /// CPU model; VMs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proctype: Option<String>,
    pub cores: u64,
    /// Bytes.
    pub memory: u64,
    /// Bytes; containers only, zero for VMs.
    pub swap: u64,
    pub volumes: BTreeMap<String, Volume>,
    pub nets: BTreeMap<String, Net>,
    pub devices: BTreeMap<String, DeviceSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot: Option<BootOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub cores: u64,
    pub memory: u64,
    pub swap: u64,
    pub devices: BTreeMap<String, DeviceSnapshot>,
    pub instances: BTreeMap<u32, InstanceSnapshot>,
}
