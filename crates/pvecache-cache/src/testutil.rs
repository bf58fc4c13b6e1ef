//! Shared fixtures for cache tests.

use std::time::Duration;

use pvecache_core::MIB;
use pvecache_source::StorageContent;
use pvecache_source::mock::{MockNode, MockSource, container, pci_device, vm};

use crate::context::CacheOptions;

pub(crate) fn fast_options() -> CacheOptions {
    CacheOptions {
        request_timeout: Duration::from_secs(2),
        retry_attempts: 2,
        retry_base_delay: Duration::from_millis(1),
        instance_concurrency: 4,
    }
}

/// `pve1`: a NIC at 0000:00:05 and a GPU at 0000:01:00, three instances.
///
/// - VM 100 `db01`: two scsi disks (one on an unlisted storage), a tagged
///   net, the whole NIC passed through, `order=net0;scsi0`.
/// - VM 101 `web01`: a virtio disk, one malformed net, a single GPU
///   function passed through, a malformed boot string.
/// - CT 200 `cache01`: rootfs, one mount point, a rate-limited net.
pub(crate) fn fixture_node() -> MockNode {
    let mut node = MockNode {
        cpus: 16,
        memory_total: 64 * 1024 * MIB,
        swap_total: 8 * 1024 * MIB,
        ..MockNode::default()
    };
    node.pci = pci_device("0000:00:05", "NIC", &["0", "1"]);
    node.pci.extend(pci_device("0000:01:00", "GPU", &["0", "1"]));

    node.storage.insert(
        "local".to_string(),
        vec![
            StorageContent {
                volid: "local:vm-100-disk-0".to_string(),
                format: "raw".to_string(),
                size: 32 * 1024 * MIB,
            },
            StorageContent {
                volid: "local:subvol-200-disk-0".to_string(),
                format: "subvol".to_string(),
                size: 8 * 1024 * MIB,
            },
        ],
    );

    node.vms.insert(
        100,
        vm(
            "db01",
            &[
                ("scsi0", "local:vm-100-disk-0,size=32G"),
                ("scsi1", "ceph:vm-100-disk-1,size=8G"),
            ],
            &[("net0", "virtio=BC:24:11:00:00:01,bridge=vmbr0,tag=20")],
            &[("hostpci0", "0000:00:05,pcie=1")],
            Some("order=net0;scsi0"),
        ),
    );
    node.vms.insert(
        101,
        vm(
            "web01",
            &[("virtio0", "local:vm-101-disk-0,size=16G")],
            &[
                ("net0", "virtio=BC:24:11:00:00:02,bridge=vmbr0,rate=fast"),
                ("net1", "virtio=BC:24:11:00:00:03,bridge=vmbr1"),
            ],
            &[("hostpci0", "01:00.1")],
            Some("bogus"),
        ),
    );
    node.containers.insert(
        200,
        container(
            "cache01",
            &[
                ("rootfs", "local:subvol-200-disk-0,size=8G"),
                ("mp0", "local:subvol-200-disk-1,mp=/data"),
            ],
            &[("net0", "name=eth0,bridge=vmbr0,ip=dhcp,rate=10")],
        ),
    );

    node
}

pub(crate) fn fixture_source() -> MockSource {
    MockSource::new().with_node("pve1", fixture_node())
}

/// A bare node with one GPU and no instances.
pub(crate) fn empty_node() -> MockNode {
    MockNode {
        cpus: 4,
        memory_total: 8 * 1024 * MIB,
        swap_total: 0,
        pci: pci_device("0000:02:00", "GPU", &["0"]),
        ..MockNode::default()
    }
}
