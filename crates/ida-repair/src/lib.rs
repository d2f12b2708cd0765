//! ida-repair
//!
//! Consumers of an audit report:
//! - timestamp repair: push the authoritative modified / frozen instant to
//!   the stores that disagree
//! - orphan-cache purge: delete webstore cache rows whose file is gone
//!
//! Both split into a pure planner over the report and an executor that
//! issues one mutation per node per store, journals every attempt and never
//! retries. A rejected mutation is a warning; the run continues.

use std::path::Path;

use anyhow::{Context, Result};
use ida_reconcile::AuditReport;

pub mod purge;
pub mod service;
pub mod timestamps;

pub use purge::{
    execute_purge, plan_purge, CacheRowStore, DbCacheRows, PurgeCandidate, PurgePlan,
    PurgeSummary, RefusedPurge,
};
pub use service::ServiceClient;
pub use timestamps::{
    execute_timestamp_repairs, plan_timestamp_repairs, HttpTimestampTarget, PlannedUpdate,
    RepairSummary, SkippedRepair, TimestampRepairPlan, TimestampTarget, TimestampUpdate,
};

/// Read and validate an audit report file.
pub fn load_report(path: &Path) -> Result<AuditReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read report {}", path.display()))?;
    AuditReport::from_json(&raw).with_context(|| format!("invalid report {}", path.display()))
}
