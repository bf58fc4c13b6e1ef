// pvecache-cache: Cluster -> node -> instance cache and its rebuild engine
// Depends on pvecache-core (types, resolvers) and pvecache-source (fetching)
//
// Lock order is always cluster -> node -> instance. Rebuilds fetch and
// resolve everything off-lock, then swap the result in under the owner's
// write lock; readers copy snapshots out under read locks.

pub mod cluster;
pub mod context;
mod flight;
mod instance;
mod node;
mod registry;
pub mod report;
pub mod sync;

pub use cluster::ClusterCache;
pub use context::CacheOptions;
pub use report::{InstanceFailure, NodeFailure, NodeRebuildReport, SyncReport};

#[cfg(test)]
pub(crate) mod testutil;
