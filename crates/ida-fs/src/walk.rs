use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ida_reconcile::{Cutoff, EntryRecord, NodePath, PathLayout};
use tracing::debug;
use walkdir::WalkDir;

use crate::mtime_of;

/// Walks `<data_root>/<project_user>/files/` and reports every file and
/// folder under the project's frozen and staging roots.
#[derive(Debug, Clone)]
pub struct FilesystemCollector {
    files_root: PathBuf,
    layout: PathLayout,
}

impl FilesystemCollector {
    pub fn new(data_root: &Path, project_user: &str, layout: PathLayout) -> Self {
        Self {
            files_root: data_root.join(project_user).join("files"),
            layout,
        }
    }

    pub fn files_root(&self) -> &Path {
        &self.files_root
    }

    /// Entries whose mtime is at or after the cut-off are dropped. Entries
    /// that vanish mid-walk are skipped; every other IO error aborts.
    pub fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, EntryRecord)>> {
        if !self.files_root.is_dir() {
            bail!(
                "project files root {} does not exist",
                self.files_root.display()
            );
        }

        let mut out = Vec::new();
        let mut dropped_new = 0usize;

        for entry in WalkDir::new(&self.files_root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                    debug!(error = %e, "entry vanished during walk");
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("walk {}", self.files_root.display())
                    })
                }
            };

            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_dir() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&self.files_root)
                .with_context(|| format!("entry {} outside walk root", entry.path().display()))?;
            let rel = rel
                .to_str()
                .with_context(|| format!("non UTF-8 path {}", entry.path().display()))?;

            let Some(path) = self.layout.normalize_subpath(rel)? else {
                continue;
            };

            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("stat {}", entry.path().display()))
                }
            };
            let modified = mtime_of(
                meta.modified()
                    .with_context(|| format!("mtime {}", entry.path().display()))?,
            );
            if !cutoff.admits(modified) {
                dropped_new += 1;
                continue;
            }

            let record = if file_type.is_file() {
                EntryRecord::file(meta.len(), modified)
            } else {
                EntryRecord::folder(modified)
            };
            out.push((path, record));
        }

        debug!(
            root = %self.files_root.display(),
            collected = out.len(),
            dropped_new,
            "filesystem walk complete"
        );
        Ok(out)
    }
}
