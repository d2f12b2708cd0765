//! Audit report model, serializer and parser.
//!
//! Output is a pure function of the merged table and the run parameters:
//! - top-level fields in fixed order (struct order below)
//! - `invalidNodes` keyed by path, ascending (BTreeMap)
//! - per-node blocks in fixed order `errors, filesystem, nextcloud, ida,
//!   metax, replication`, absent blocks omitted
//! - per-record fields in fixed order `type, size, pid, checksum, modified,
//!   frozen, replicated`, absent fields omitted
//! - error tags in contract order (timestamp tags last)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compare::{compare, CompareOptions};
use crate::merge::MergedTable;
use crate::path::NodePath;
use crate::tags::ErrorTag;
use crate::timestamp::{Cutoff, Timestamp};
use crate::types::Node;

#[derive(Debug)]
pub enum ReportError {
    Serialize(serde_json::Error),
    Parse(serde_json::Error),
    /// `invalidNodeCount` disagrees with the number of `invalidNodes`.
    CountMismatch { declared: usize, actual: usize },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(e) => write!(f, "report serialization failed: {e}"),
            Self::Parse(e) => write!(f, "report parse failed: {e}"),
            Self::CountMismatch { declared, actual } => write!(
                f,
                "report declares invalidNodeCount={declared} but lists {actual} invalid nodes"
            ),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialize(e) | Self::Parse(e) => Some(e),
            Self::CountMismatch { .. } => None,
        }
    }
}

/// One audit run's findings.
///
/// `start` is the cut-off instant `T` of the run; `end` is when the run
/// finished comparing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub project: String,
    pub ignore_timestamps: bool,
    pub start: Timestamp,
    pub end: Timestamp,
    pub filesystem_node_count: usize,
    pub nextcloud_node_count: usize,
    pub ida_node_count: usize,
    pub metax_node_count: usize,
    pub invalid_node_count: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub invalid_nodes: BTreeMap<NodePath, Node>,
}

impl AuditReport {
    /// Run the comparator over every merged entry and keep the invalid ones.
    pub fn build(
        project: &str,
        cutoff: Cutoff,
        opts: CompareOptions,
        end: Timestamp,
        table: MergedTable,
    ) -> Self {
        let counts = table.counts();
        let mut invalid_nodes: BTreeMap<NodePath, Node> = BTreeMap::new();

        for (path, mut node) in table.into_nodes() {
            node.errors = compare(&path, &node, opts);
            if !node.is_valid() {
                invalid_nodes.insert(path, node);
            }
        }

        Self {
            project: project.to_string(),
            ignore_timestamps: !opts.compare_timestamps,
            start: cutoff.at(),
            end,
            filesystem_node_count: counts.filesystem,
            nextcloud_node_count: counts.nextcloud,
            ida_node_count: counts.ida,
            metax_node_count: counts.metax,
            invalid_node_count: invalid_nodes.len(),
            invalid_nodes,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.invalid_node_count == 0
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            compare_timestamps: !self.ignore_timestamps,
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, ReportError> {
        let mut s = serde_json::to_string_pretty(self).map_err(ReportError::Serialize)?;
        s.push('\n');
        Ok(s)
    }

    pub fn from_json(raw: &str) -> Result<Self, ReportError> {
        let report: AuditReport = serde_json::from_str(raw).map_err(ReportError::Parse)?;
        if report.invalid_node_count != report.invalid_nodes.len() {
            return Err(ReportError::CountMismatch {
                declared: report.invalid_node_count,
                actual: report.invalid_nodes.len(),
            });
        }
        Ok(report)
    }

    /// Re-run the comparator on the report's own merged view of each invalid
    /// node. For an untampered report this equals each node's `errors`.
    pub fn recompute_errors(&self) -> BTreeMap<NodePath, BTreeSet<ErrorTag>> {
        let opts = self.compare_options();
        self.invalid_nodes
            .iter()
            .map(|(path, node)| (path.clone(), compare(path, node, opts)))
            .collect()
    }

    /// Invalid nodes whose error set contains `tag`.
    pub fn nodes_with<'a>(
        &'a self,
        tag: &'a ErrorTag,
    ) -> impl Iterator<Item = (&'a NodePath, &'a Node)> + 'a {
        self.invalid_nodes
            .iter()
            .filter(move |(_, n)| n.errors.contains(tag))
    }
}
