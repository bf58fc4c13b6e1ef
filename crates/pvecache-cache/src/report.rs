use chrono::{DateTime, Utc};
use pvecache_core::model::InstanceType;
use serde::Serialize;

/// An instance that could not be rebuilt; it is absent from the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub vmid: u32,
    pub error: String,
}

/// Outcome of one node rebuild. Instance failures never abort the rebuild;
/// they are collected here instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRebuildReport {
    pub node: String,
    pub instances: usize,
    pub devices: usize,
    pub failures: Vec<InstanceFailure>,
}

impl NodeRebuildReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub node: String,
    pub error: String,
}

/// Outcome of a full sync: nodes now in the cache, and nodes dropped from it.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub synced: Vec<NodeRebuildReport>,
    pub failed: Vec<NodeFailure>,
}

impl SyncReport {
    pub fn instance_count(&self) -> usize {
        self.synced.iter().map(|n| n.instances).sum()
    }

    pub fn instance_failure_count(&self) -> usize {
        self.synced.iter().map(|n| n.failures.len()).sum()
    }
}
