//! Per-node PCI device registry, built from the flat function listing.

use std::collections::{BTreeMap, HashSet};

use pvecache_core::model::{DeviceSnapshot, FunctionSnapshot};
use pvecache_core::pci;
use pvecache_source::PciFunction;
use tracing::warn;

#[derive(Debug, Clone)]
struct Function {
    device_name: String,
    vendor_name: String,
    subsystem_device_name: String,
    subsystem_vendor_name: String,
    reserved: bool,
}

#[derive(Debug, Clone)]
struct Device {
    device_name: String,
    vendor_name: String,
    functions: BTreeMap<String, Function>,
    /// OR of the functions' flags; see [`DeviceRegistry::recompute_reservations`].
    reserved: bool,
}

/// Devices keyed by bus id, each holding its functions keyed by suffix.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    /// Group functions by bus id. Entries whose id has no function suffix
    /// are skipped with a warning.
    pub(crate) fn build(functions: &[PciFunction]) -> Self {
        let mut devices: BTreeMap<String, Device> = BTreeMap::new();

        for f in functions {
            let (bus_id, suffix) = match pci::split_function_id(&f.id) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(error = %e, "Skipping PCI function with malformed id");
                    continue;
                }
            };

            let device = devices.entry(bus_id).or_insert_with(|| Device {
                device_name: f.device_name.clone(),
                vendor_name: f.vendor_name.clone(),
                functions: BTreeMap::new(),
                reserved: false,
            });
            device.functions.insert(
                suffix,
                Function {
                    device_name: f.device_name.clone(),
                    vendor_name: f.vendor_name.clone(),
                    subsystem_device_name: f.subsystem_device_name.clone(),
                    subsystem_vendor_name: f.subsystem_vendor_name.clone(),
                    reserved: false,
                },
            );
        }

        Self { devices }
    }

    pub(crate) fn contains(&self, bus_id: &str) -> bool {
        self.devices.contains_key(bus_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.devices.len()
    }

    /// Reset every flag from the set of claimed bus ids: each function of a
    /// claimed device is reserved, then each device is the OR of its
    /// functions. Claims naming unknown devices are ignored.
    pub(crate) fn recompute_reservations<'a, I>(&mut self, claimed: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let claimed: HashSet<&str> = claimed.into_iter().collect();
        for (bus_id, device) in &mut self.devices {
            let is_claimed = claimed.contains(bus_id.as_str());
            for function in device.functions.values_mut() {
                function.reserved = is_claimed;
            }
            device.reserved = device.functions.values().any(|f| f.reserved);
        }
    }

    pub(crate) fn device(&self, bus_id: &str) -> Option<DeviceSnapshot> {
        self.devices.get(bus_id).map(|d| snapshot(bus_id, d))
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, DeviceSnapshot> {
        self.devices
            .iter()
            .map(|(bus_id, d)| (bus_id.clone(), snapshot(bus_id, d)))
            .collect()
    }
}

fn snapshot(bus_id: &str, device: &Device) -> DeviceSnapshot {
    DeviceSnapshot {
        bus_id: bus_id.to_string(),
        device_name: device.device_name.clone(),
        vendor_name: device.vendor_name.clone(),
        functions: device
            .functions
            .iter()
            .map(|(id, f)| {
                (
                    id.clone(),
                    FunctionSnapshot {
                        id: id.clone(),
                        device_name: f.device_name.clone(),
                        vendor_name: f.vendor_name.clone(),
                        subsystem_device_name: f.subsystem_device_name.clone(),
                        subsystem_vendor_name: f.subsystem_vendor_name.clone(),
                        reserved: f.reserved,
                    },
                )
            })
            .collect(),
        reserved: device.reserved,
    }
}
