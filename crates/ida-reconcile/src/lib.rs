//! ida-reconcile
//!
//! Cross-source reconciliation core for the project auditor.
//!
//! Four stores describe the same project: the filesystem, the Nextcloud
//! metadata cache, the IDA frozen-file registry and the Metax catalog. This
//! crate aligns their records on a common [`NodePath`], applies the rule-based
//! comparator and produces the deterministic [`AuditReport`].
//!
//! Deterministic, pure logic. No IO. No database or HTTP calls.

pub mod checksum;
mod compare;
mod merge;
pub mod path;
mod report;
mod tags;
pub mod timestamp;
mod types;

pub use checksum::normalize_checksum;
pub use compare::{compare, CompareOptions};
pub use merge::{MergeError, MergedTable, SourceCounts};
pub use path::{frozen_from_stored, Area, NodePath, PathError, PathLayout};
pub use report::{AuditReport, ReportError};
pub use tags::{ErrorTag, Store, UnknownErrorTag};
pub use timestamp::{Cutoff, Timestamp, TimestampError};
pub use types::*;
