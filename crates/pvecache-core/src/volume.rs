//! Volume descriptor parsing (`storage:volume[,opt=val,...]`).

use crate::error::{CacheError, Result};
use crate::model::{Volume, VolumeType};

/// Storage and volume ids named by a disk config entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRef {
    /// Text before the first `:`.
    pub storage: String,
    /// Text before the first `,`, i.e. `storage:path`.
    pub volid: String,
}

impl VolumeRef {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let volid = descriptor.split(',').next().unwrap_or_default().trim();
        let Some((storage, _)) = volid.split_once(':') else {
            return Err(CacheError::parse(
                "volume",
                descriptor,
                "expected storage:volume",
            ));
        };
        if storage.is_empty() {
            return Err(CacheError::parse("volume", descriptor, "empty storage id"));
        }
        Ok(Self {
            storage: storage.to_string(),
            volid: volid.to_string(),
        })
    }
}

/// Classify a disk config key, failing for keys outside the prefix table.
pub fn classify(key: &str) -> Result<VolumeType> {
    VolumeType::classify(key)
        .ok_or_else(|| CacheError::parse("volume key", key, "unknown disk prefix"))
}

/// Build a volume from its parsed reference and, when the storage listing
/// had a matching entry, that entry's format and size.
pub fn build(kind: VolumeType, volume: &VolumeRef, content: Option<(&str, u64)>) -> Volume {
    let (format, size) = content.unwrap_or_default();
    Volume {
        kind,
        storage: volume.storage.clone(),
        format: format.to_string(),
        size,
        volid: volume.volid.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_options() {
        let r = VolumeRef::parse("local-lvm:vm-100-disk-0,iothread=1,size=32G").unwrap();
        assert_eq!(r.storage, "local-lvm");
        assert_eq!(r.volid, "local-lvm:vm-100-disk-0");
    }

    #[test]
    fn test_parse_bare() {
        let r = VolumeRef::parse("local:100/vm-100-disk-0.qcow2").unwrap();
        assert_eq!(r.storage, "local");
        assert_eq!(r.volid, "local:100/vm-100-disk-0.qcow2");
    }

    #[test]
    fn test_parse_rejects_missing_storage() {
        assert!(VolumeRef::parse("none,media=cdrom").is_err());
        assert!(VolumeRef::parse(":vm-100-disk-0").is_err());
    }

    #[test]
    fn test_classify_unknown_key() {
        assert_eq!(classify("scsi0").unwrap(), VolumeType::Scsi);
        assert!(classify("tpmstate0").is_err());
    }

    #[test]
    fn test_build_without_content_is_zeroed() {
        let r = VolumeRef::parse("ceph:vm-100-disk-1").unwrap();
        let v = build(VolumeType::Unused, &r, None);
        assert_eq!(v.format, "");
        assert_eq!(v.size, 0);
        assert_eq!(v.storage, "ceph");
        assert_eq!(v.volid, "ceph:vm-100-disk-1");
    }

    #[test]
    fn test_build_with_content() {
        let r = VolumeRef::parse("local-lvm:vm-100-disk-0,size=8G").unwrap();
        let v = build(VolumeType::Rootfs, &r, Some(("raw", 8 * 1024 * 1024 * 1024)));
        assert_eq!(v.kind, VolumeType::Rootfs);
        assert_eq!(v.format, "raw");
        assert_eq!(v.size, 8589934592);
    }
}
