//! Terminal rendering of sync results and config summaries.

use colored::Colorize;
use pvecache_cache::SyncReport;
use pvecache_core::config::PvecacheConfig;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

/// Display row for each node touched by `sync`.
#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    #[tabled(rename = "NODE")]
    pub node: String,
    #[tabled(rename = "STATUS")]
    pub status: String,
    #[tabled(rename = "INSTANCES")]
    pub instances: String,
    #[tabled(rename = "DEVICES")]
    pub devices: String,
    #[tabled(rename = "FAILURES")]
    pub failures: usize,
}

/// Display row for an instance that failed to rebuild.
#[derive(Debug, Serialize, Tabled)]
pub struct FailureRow {
    #[tabled(rename = "NODE")]
    pub node: String,
    #[tabled(rename = "VMID")]
    pub vmid: u32,
    #[tabled(rename = "TYPE")]
    pub kind: String,
    #[tabled(rename = "ERROR")]
    pub error: String,
}

/// Totals for a whole sync.
#[derive(Debug, Serialize, Tabled)]
pub struct SyncSummary {
    #[tabled(rename = "NODES")]
    pub nodes: usize,
    #[tabled(rename = "FAILED NODES")]
    pub failed_nodes: usize,
    #[tabled(rename = "INSTANCES")]
    pub instances: usize,
    #[tabled(rename = "INSTANCE FAILURES")]
    pub instance_failures: usize,
    #[tabled(rename = "ELAPSED MS")]
    pub elapsed_ms: i64,
}

impl From<&SyncReport> for SyncSummary {
    fn from(report: &SyncReport) -> Self {
        Self {
            nodes: report.synced.len(),
            failed_nodes: report.failed.len(),
            instances: report.instance_count(),
            instance_failures: report.instance_failure_count(),
            elapsed_ms: (report.finished_at - report.started_at).num_milliseconds(),
        }
    }
}

/// Display row for `check-config`.
#[derive(Debug, Serialize, Tabled)]
pub struct SettingRow {
    #[tabled(rename = "SETTING")]
    pub setting: &'static str,
    #[tabled(rename = "VALUE")]
    pub value: String,
}

pub fn node_rows(report: &SyncReport) -> Vec<NodeRow> {
    let synced = report.synced.iter().map(|n| NodeRow {
        node: n.node.clone(),
        status: "ok".to_string(),
        instances: n.instances.to_string(),
        devices: n.devices.to_string(),
        failures: n.failures.len(),
    });
    let failed = report.failed.iter().map(|n| NodeRow {
        node: n.node.clone(),
        status: format!("failed: {}", n.error),
        instances: "-".to_string(),
        devices: "-".to_string(),
        failures: 0,
    });
    synced.chain(failed).collect()
}

pub fn failure_rows(report: &SyncReport) -> Vec<FailureRow> {
    report
        .synced
        .iter()
        .flat_map(|n| {
            n.failures.iter().map(|f| FailureRow {
                node: n.node.clone(),
                vmid: f.vmid,
                kind: f.kind.to_string(),
                error: f.error.clone(),
            })
        })
        .collect()
}

/// Render a sync report as a node table, a failure table when any
/// instance failed, and a totals row.
pub fn sync_report(report: &SyncReport) -> String {
    let mut out = output::render_list(&node_rows(report), OutputFormat::Table);

    let failures = failure_rows(report);
    if !failures.is_empty() {
        out.push_str(&format!(
            "\n\n{}\n{}",
            "Instance failures".yellow().bold(),
            output::render_list(&failures, OutputFormat::Table)
        ));
    }

    out.push_str("\n\n");
    out.push_str(&output::render_one(
        &SyncSummary::from(report),
        OutputFormat::Table,
    ));
    out
}

pub fn setting_rows(config: &PvecacheConfig) -> Vec<SettingRow> {
    vec![
        SettingRow {
            setting: "listen",
            value: config.listen.to_string(),
        },
        SettingRow {
            setting: "pve.url",
            value: config.pve.url.clone(),
        },
        SettingRow {
            setting: "pve.token",
            value: format!(
                "{}@{}!{}",
                config.pve.user, config.pve.realm, config.pve.token_id
            ),
        },
        SettingRow {
            setting: "pve.timeout",
            value: format!("{}s", config.pve.request_timeout_secs),
        },
        SettingRow {
            setting: "sync.interval",
            value: format!("{}s", config.sync.interval_secs),
        },
        SettingRow {
            setting: "sync.concurrency",
            value: config.sync.instance_concurrency.to_string(),
        },
        SettingRow {
            setting: "sync.retries",
            value: format!(
                "{} (base {} ms)",
                config.sync.retry_attempts, config.sync.retry_base_delay_ms
            ),
        },
    ]
}

/// Effective settings as a table. The token secret is never shown.
pub fn config_summary(config: &PvecacheConfig) -> String {
    output::render_list(&setting_rows(config), OutputFormat::Table)
}
