use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ida_reconcile::{EntryRecord, NodePath, NodeType};

use crate::mtime_of;

/// `stat` of a frozen file's copy at `<replication_root>/<project>/<rel>`.
#[derive(Debug, Clone)]
pub struct ReplicationProbe {
    project_root: PathBuf,
}

impl ReplicationProbe {
    pub fn new(replication_root: impl Into<PathBuf>, project: &str) -> Self {
        Self {
            project_root: replication_root.into().join(project),
        }
    }

    /// `Ok(None)` when the replica does not exist. Anything other than a
    /// regular file yields a bare `{type: folder}` record.
    pub fn probe(&self, path: &NodePath) -> Result<Option<EntryRecord>> {
        let target = self.project_root.join(path.rel());
        let meta = match std::fs::metadata(&target) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("stat {}", target.display())),
        };
        if !meta.is_file() {
            return Ok(Some(EntryRecord {
                node_type: NodeType::Folder,
                size: None,
                modified: None,
            }));
        }
        let modified = meta
            .modified()
            .with_context(|| format!("mtime {}", target.display()))?;
        Ok(Some(EntryRecord::file(meta.len(), mtime_of(modified))))
    }
}
