//! Orphan-cache purge.
//!
//! A webstore cache row is an orphan when the report's only finding for its
//! node is "Node does not exist in filesystem". Nodes with that tag and any
//! other finding are refused.

use anyhow::{Context, Result};
use ida_config::{IdaConfig, ResolvedSecrets};
use ida_db::Tables;
use ida_journal::{JournalAction, JournalOutcome, JournalRecord, RepairJournal};
use ida_reconcile::{AuditReport, ErrorTag, NodePath, PathLayout, Store};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeCandidate {
    pub path: NodePath,
    /// Raw cache path, `files/<project>[<suffix>]/<rel>`.
    pub webstore_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusedPurge {
    pub path: NodePath,
    pub errors: Vec<ErrorTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgePlan {
    pub candidates: Vec<PurgeCandidate>,
    pub refused: Vec<RefusedPurge>,
}

pub fn plan_purge(report: &AuditReport, layout: &PathLayout) -> PurgePlan {
    let orphan = ErrorTag::Missing(Store::Filesystem);
    let mut plan = PurgePlan::default();

    for (path, node) in report.nodes_with(&orphan) {
        if node.nextcloud.is_none() {
            continue;
        }
        if node.errors.len() == 1 {
            plan.candidates.push(PurgeCandidate {
                path: path.clone(),
                webstore_path: layout.webstore_path(path),
            });
        } else {
            plan.refused.push(RefusedPurge {
                path: path.clone(),
                errors: node.errors.iter().copied().collect(),
            });
        }
    }
    plan
}

/// Single-row deletes against the webstore cache.
#[async_trait::async_trait]
pub trait CacheRowStore: Send + Sync {
    /// Rows deleted for `webstore_path`.
    async fn delete_row(&self, webstore_path: &str) -> Result<u64>;
}

pub struct DbCacheRows {
    pool: PgPool,
    tables: Tables,
    storage_id: i64,
}

impl DbCacheRows {
    pub fn new(pool: PgPool, tables: Tables, storage_id: i64) -> Self {
        Self {
            pool,
            tables,
            storage_id,
        }
    }

    /// Connect and resolve the project user's storage id.
    pub async fn connect(
        cfg: &IdaConfig,
        secrets: &ResolvedSecrets,
        project: &str,
    ) -> Result<Self> {
        let db = cfg.database()?;
        let password = secrets
            .database_password
            .as_deref()
            .context("database password was not resolved")?;
        let pool = ida_db::connect(db, password).await?;
        let tables = Tables::new(&db.table_prefix)?;
        let storage_id =
            ida_db::lookup_storage_id(&pool, &tables, &cfg.project_user(project)).await?;
        Ok(Self::new(pool, tables, storage_id))
    }
}

#[async_trait::async_trait]
impl CacheRowStore for DbCacheRows {
    async fn delete_row(&self, webstore_path: &str) -> Result<u64> {
        ida_db::delete_cache_row(&self.pool, &self.tables, self.storage_id, webstore_path).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub candidates: usize,
    pub deleted: usize,
    /// Candidates whose row was already gone.
    pub missing: usize,
    pub refused: usize,
}

impl std::fmt::Display for PurgeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "candidates={} deleted={} missing={} refused={}",
            self.candidates, self.deleted, self.missing, self.refused
        )
    }
}

/// Delete every candidate row, committing each statement on its own.
/// Without a store this is a dry run: candidates are only journaled.
///
/// A database error aborts after it is journaled; a delete that matches no
/// row is a warning.
pub async fn execute_purge(
    plan: &PurgePlan,
    store: Option<&dyn CacheRowStore>,
    journal: &mut RepairJournal,
) -> Result<PurgeSummary> {
    let mut summary = PurgeSummary {
        candidates: plan.candidates.len(),
        refused: plan.refused.len(),
        ..PurgeSummary::default()
    };

    for refused in &plan.refused {
        let errors: Vec<String> = refused.errors.iter().map(ToString::to_string).collect();
        warn!(path = %refused.path, ?errors, "purge refused: node has other findings");
        journal.append(JournalRecord {
            action: JournalAction::DeleteCacheRow,
            path: refused.path.as_str(),
            store: Some("nextcloud"),
            outcome: JournalOutcome::Refused,
            detail: json!({ "errors": errors }),
        })?;
    }

    for candidate in &plan.candidates {
        let path = candidate.path.as_str();
        let Some(store) = store else {
            info!(path, row = %candidate.webstore_path, "dry run: cache row delete planned");
            journal.append(JournalRecord {
                action: JournalAction::DeleteCacheRow,
                path,
                store: Some("nextcloud"),
                outcome: JournalOutcome::Planned,
                detail: json!({ "row": candidate.webstore_path }),
            })?;
            continue;
        };

        let deleted = match store.delete_row(&candidate.webstore_path).await {
            Ok(n) => n,
            Err(e) => {
                journal.append(JournalRecord {
                    action: JournalAction::DeleteCacheRow,
                    path,
                    store: Some("nextcloud"),
                    outcome: JournalOutcome::Failed,
                    detail: json!({ "row": candidate.webstore_path, "error": format!("{e:#}") }),
                })?;
                return Err(e);
            }
        };

        let outcome = if deleted == 0 {
            warn!(path, row = %candidate.webstore_path, "cache row already gone");
            summary.missing += 1;
            JournalOutcome::Failed
        } else {
            info!(path, row = %candidate.webstore_path, "cache row deleted");
            summary.deleted += 1;
            JournalOutcome::Applied
        };
        journal.append(JournalRecord {
            action: JournalAction::DeleteCacheRow,
            path,
            store: Some("nextcloud"),
            outcome,
            detail: json!({ "row": candidate.webstore_path, "rows": deleted }),
        })?;
    }

    Ok(summary)
}
