// pvecache-core: Pure types, errors, config, attribute resolvers
// No internal pvecache dependencies; this is the foundation crate.

pub mod boot;
pub mod config;
pub mod error;
pub mod model;
pub mod net;
pub mod pci;
pub mod retry;
pub mod volume;

/// Proxmox reports memory and swap in MiB; the cache stores bytes.
pub const MIB: u64 = 1024 * 1024;

/// Version of the read/trigger surface exposed by pvecache.
pub const API_VERSION: &str = "0.0.1";
