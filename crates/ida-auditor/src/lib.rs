//! ida-auditor
//!
//! Audit orchestration. Collectors run one after another at a fixed cut-off,
//! their pairs are folded into one [`MergedTable`], registry records with a
//! replication timestamp are probed against the replica, and the comparator
//! turns the table into an [`AuditReport`].
//!
//! Any collector error aborts the run; no partial report exists.

use anyhow::{Context, Result};
use chrono::Utc;
use ida_reconcile::{
    AuditReport, CompareOptions, Cutoff, EntryRecord, MergedTable, NodePath, Source, SourceRecord,
    Timestamp,
};
use tracing::{debug, info};

pub mod adapters;

pub use adapters::{
    build_auditor, CatalogCollector, FilesystemSource, RegistryCollector, WebstoreCollector,
};

/// One store's view of the project at cut-off `T`.
///
/// Implementations must drop every record whose recorded instant is not
/// strictly before `T`, and emit at most one record per path.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> Source;

    async fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, SourceRecord)>>;
}

/// Lookup of a frozen file's copy in the replication store.
pub trait ReplicaProbe: Send + Sync {
    /// `Ok(None)` when the replica is absent.
    fn probe(&self, path: &NodePath) -> Result<Option<EntryRecord>>;
}

impl ReplicaProbe for ida_fs::ReplicationProbe {
    fn probe(&self, path: &NodePath) -> Result<Option<EntryRecord>> {
        ida_fs::ReplicationProbe::probe(self, path)
    }
}

fn now_utc() -> Timestamp {
    Timestamp::from_datetime(&Utc::now())
}

pub struct Auditor {
    project: String,
    collectors: Vec<Box<dyn Collector>>,
    replication: Box<dyn ReplicaProbe>,
    clock: fn() -> Timestamp,
}

impl Auditor {
    pub fn new(project: impl Into<String>, replication: Box<dyn ReplicaProbe>) -> Self {
        Self {
            project: project.into(),
            collectors: Vec::new(),
            replication,
            clock: now_utc,
        }
    }

    pub fn with_collector(mut self, collector: Box<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Override the clock used for the report's `end`.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Collect, merge and probe. The returned table has no errors assigned.
    pub async fn merged_table(&self, cutoff: Cutoff) -> Result<MergedTable> {
        let mut table = MergedTable::new();
        for collector in &self.collectors {
            let source = collector.source();
            let pairs = collector
                .collect(cutoff)
                .await
                .with_context(|| format!("{source} collector failed"))?;
            info!(project = %self.project, %source, records = pairs.len(), "collected");

            for (path, record) in pairs {
                if record.source() != source {
                    anyhow::bail!(
                        "{source} collector emitted a {} record for '{path}'",
                        record.source()
                    );
                }
                table
                    .insert(path, record)
                    .context("merge invariant violated")?;
            }
        }
        self.attach_replication(&mut table)?;
        Ok(table)
    }

    fn attach_replication(&self, table: &mut MergedTable) -> Result<()> {
        let mut probed = 0usize;
        for (path, node) in table.iter_mut() {
            if node.replicated_at().is_none() {
                continue;
            }
            node.replication = self
                .replication
                .probe(path)
                .with_context(|| format!("replication probe failed for '{path}'"))?;
            probed += 1;
        }
        debug!(project = %self.project, probed, "replication probed");
        Ok(())
    }

    /// Full audit run. `start` of the report is the cut-off, `end` is read
    /// from the clock once all collectors have finished.
    pub async fn run(&self, cutoff: Cutoff, opts: CompareOptions) -> Result<AuditReport> {
        let table = self.merged_table(cutoff).await?;
        let end = (self.clock)();
        let report = AuditReport::build(&self.project, cutoff, opts, end, table);
        info!(
            project = %self.project,
            start = %report.start,
            end = %report.end,
            invalid = report.invalid_node_count,
            "audit complete"
        );
        Ok(report)
    }
}
