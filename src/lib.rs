//! # pvecache: in-memory inventory cache for Proxmox VE clusters
//!
//! Facade crate that re-exports the pvecache workspace crates so consumers
//! can depend on a single `pvecache` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | pvecache-core | Snapshot types, errors, config, attribute resolvers |
//! | [`source`] | pvecache-source | Inventory source trait, Proxmox VE API client |
//! | [`cache`] | pvecache-cache | Cluster/node/instance caches, rebuild coalescing, sync loop |
//! | [`cli`] | pvecache-cli | Clap commands, HTTP surface, daemon wiring |

pub use pvecache_cache as cache;
pub use pvecache_cli as cli;
pub use pvecache_core as core;
pub use pvecache_source as source;
