//! Timestamp repair.
//!
//! A modification-timestamp tag makes the filesystem mtime authoritative and
//! pushes it to the webstore, the registry and the catalog, in that order.
//! A frozen-timestamp tag makes the registry's frozen instant authoritative
//! and pushes it to the catalog only. Each store receives at most one
//! mutation per node.

use anyhow::Result;
use ida_catalog::{CatalogClient, CatalogTimestamps};
use ida_journal::{JournalAction, JournalOutcome, JournalRecord, RepairJournal};
use ida_reconcile::{AuditReport, NodePath, Timestamp};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::service::ServiceClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampUpdate {
    /// Path-keyed, through the service API.
    Webstore { modified: Timestamp },
    /// Pid-keyed, through the service API.
    Registry { pid: String, modified: Timestamp },
    /// Pid-keyed; both repairs for a file travel together.
    Catalog {
        pid: String,
        timestamps: CatalogTimestamps,
    },
}

impl TimestampUpdate {
    pub fn store(&self) -> &'static str {
        match self {
            TimestampUpdate::Webstore { .. } => "nextcloud",
            TimestampUpdate::Registry { .. } => "ida",
            TimestampUpdate::Catalog { .. } => "metax",
        }
    }

    /// The values being written, as journaled.
    pub fn detail(&self) -> Value {
        match self {
            TimestampUpdate::Webstore { modified } | TimestampUpdate::Registry { modified, .. } => {
                json!({ "modified": modified.to_string() })
            }
            TimestampUpdate::Catalog { timestamps, .. } => {
                let mut detail = serde_json::Map::new();
                if let Some(m) = timestamps.modified {
                    detail.insert("modified".to_string(), json!(m.to_string()));
                }
                if let Some(f) = timestamps.frozen {
                    detail.insert("frozen".to_string(), json!(f.to_string()));
                }
                Value::Object(detail)
            }
        }
    }

    fn action(&self) -> JournalAction {
        match self {
            TimestampUpdate::Catalog { timestamps, .. } => {
                match (timestamps.modified, timestamps.frozen) {
                    (Some(_), Some(_)) => JournalAction::UpdateTimestamps,
                    (None, Some(_)) => JournalAction::UpdateFrozen,
                    _ => JournalAction::UpdateModified,
                }
            }
            _ => JournalAction::UpdateModified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub path: NodePath,
    pub update: TimestampUpdate,
}

/// A node that needs a repair the report gives no authoritative value for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRepair {
    pub path: NodePath,
    pub action: JournalAction,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampRepairPlan {
    pub updates: Vec<PlannedUpdate>,
    pub skipped: Vec<SkippedRepair>,
}

/// Plan updates for every invalid node carrying a timestamp tag. Updates
/// are only planned for stores that have a record for the node.
pub fn plan_timestamp_repairs(report: &AuditReport) -> TimestampRepairPlan {
    let mut plan = TimestampRepairPlan::default();

    for (path, node) in &report.invalid_nodes {
        let modification = node.errors.iter().any(|t| t.is_modification_timestamp());
        let frozen = node.errors.iter().any(|t| t.is_frozen_timestamp());
        let mut catalog = CatalogTimestamps::default();

        if modification {
            match node.filesystem.as_ref().and_then(|fs| fs.modified) {
                None => plan.skipped.push(SkippedRepair {
                    path: path.clone(),
                    action: JournalAction::UpdateModified,
                    reason: "no filesystem modified timestamp",
                }),
                Some(modified) => {
                    if node.nextcloud.is_some() {
                        plan.updates.push(PlannedUpdate {
                            path: path.clone(),
                            update: TimestampUpdate::Webstore { modified },
                        });
                    }
                    if let Some(ida) = &node.ida {
                        plan.updates.push(PlannedUpdate {
                            path: path.clone(),
                            update: TimestampUpdate::Registry {
                                pid: ida.pid.clone(),
                                modified,
                            },
                        });
                    }
                    catalog.modified = Some(modified);
                }
            }
        }

        if frozen {
            match (&node.ida, &node.metax) {
                (Some(ida), Some(_)) => catalog.frozen = Some(ida.frozen),
                _ => plan.skipped.push(SkippedRepair {
                    path: path.clone(),
                    action: JournalAction::UpdateFrozen,
                    reason: "frozen repair needs both registry and catalog records",
                }),
            }
        }

        if let Some(metax) = node.metax.as_ref().filter(|_| !catalog.is_empty()) {
            plan.updates.push(PlannedUpdate {
                path: path.clone(),
                update: TimestampUpdate::Catalog {
                    pid: metax.pid.clone(),
                    timestamps: catalog,
                },
            });
        }
    }
    plan
}

/// Where planned updates are sent.
#[async_trait::async_trait]
pub trait TimestampTarget: Send + Sync {
    async fn apply(&self, path: &NodePath, update: &TimestampUpdate) -> Result<()>;
}

/// Service API for the webstore and registry, catalog client for the catalog.
pub struct HttpTimestampTarget {
    service: ServiceClient,
    catalog: CatalogClient,
}

impl HttpTimestampTarget {
    pub fn new(service: ServiceClient, catalog: CatalogClient) -> Self {
        Self { service, catalog }
    }
}

#[async_trait::async_trait]
impl TimestampTarget for HttpTimestampTarget {
    async fn apply(&self, path: &NodePath, update: &TimestampUpdate) -> Result<()> {
        match update {
            TimestampUpdate::Webstore { modified } => {
                self.service.repair_node_timestamp(path, *modified).await
            }
            TimestampUpdate::Registry { pid, modified } => {
                self.service.update_frozen_file_modified(pid, *modified).await
            }
            TimestampUpdate::Catalog { pid, timestamps } => {
                Ok(self.catalog.update_timestamps(pid, timestamps).await?)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub planned: usize,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl std::fmt::Display for RepairSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "planned={} applied={} failed={} skipped={}",
            self.planned, self.applied, self.failed, self.skipped
        )
    }
}

/// Issue (or, in dry-run, only journal) every planned update.
///
/// A failed update is logged and journaled; the next one proceeds. Only a
/// journal write failure aborts.
pub async fn execute_timestamp_repairs(
    plan: &TimestampRepairPlan,
    target: &dyn TimestampTarget,
    journal: &mut RepairJournal,
    dry_run: bool,
) -> Result<RepairSummary> {
    let mut summary = RepairSummary {
        planned: plan.updates.len(),
        skipped: plan.skipped.len(),
        ..RepairSummary::default()
    };

    for skip in &plan.skipped {
        warn!(path = %skip.path, reason = skip.reason, "timestamp repair skipped");
        journal.append(JournalRecord {
            action: skip.action,
            path: skip.path.as_str(),
            store: None,
            outcome: JournalOutcome::Refused,
            detail: json!({ "reason": skip.reason }),
        })?;
    }

    for planned in &plan.updates {
        let store = planned.update.store();
        let mut detail = planned.update.detail();

        let outcome = if dry_run {
            info!(path = %planned.path, store, %detail, "dry run: timestamp update planned");
            JournalOutcome::Planned
        } else {
            match target.apply(&planned.path, &planned.update).await {
                Ok(()) => {
                    info!(path = %planned.path, store, %detail, "timestamp updated");
                    summary.applied += 1;
                    JournalOutcome::Applied
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(path = %planned.path, store, %error, "timestamp update failed");
                    summary.failed += 1;
                    detail["error"] = Value::String(error);
                    JournalOutcome::Failed
                }
            }
        };

        journal.append(JournalRecord {
            action: planned.update.action(),
            path: planned.path.as_str(),
            store: Some(store),
            outcome,
            detail,
        })?;
    }

    Ok(summary)
}
