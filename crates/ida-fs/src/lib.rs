//! ida-fs
//!
//! Local-disk side of the audit: the project tree walk, the replication
//! mirror probe and the streaming SHA-256 checksum generator.

mod checksum;
mod replication;
mod walk;

pub use checksum::{sha256_file, CHECKSUM_BLOCK_SIZE};
pub use replication::ReplicationProbe;
pub use walk::FilesystemCollector;

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use ida_reconcile::Timestamp;

pub(crate) fn mtime_of(modified: SystemTime) -> Timestamp {
    Timestamp::from_datetime(&DateTime::<Utc>::from(modified))
}
