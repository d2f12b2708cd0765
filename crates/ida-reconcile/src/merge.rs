use std::collections::BTreeMap;
use std::fmt;

use crate::path::NodePath;
use crate::types::{Node, Source, SourceRecord};

/// A collector emitted the same path twice.
///
/// This is an invariant violation in the collector (or a corrupt store); the
/// audit must abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeError {
    pub source: Source,
    pub path: NodePath,
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate {} record for path '{}'",
            self.source, self.path
        )
    }
}

impl std::error::Error for MergeError {}

/// Number of records contributed by each source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceCounts {
    pub filesystem: usize,
    pub nextcloud: usize,
    pub ida: usize,
    pub metax: usize,
}

impl SourceCounts {
    fn bump(&mut self, source: Source) {
        match source {
            Source::Filesystem => self.filesystem += 1,
            Source::Nextcloud => self.nextcloud += 1,
            Source::Ida => self.ida += 1,
            Source::Metax => self.metax += 1,
        }
    }
}

/// `path -> {source -> record}`.
///
/// Groups records only; it never interprets them. Iteration is ascending by
/// path. A path is present iff at least one source reported it.
#[derive(Clone, Debug, Default)]
pub struct MergedTable {
    nodes: BTreeMap<NodePath, Node>,
    counts: SourceCounts,
}

impl MergedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: NodePath, record: SourceRecord) -> Result<(), MergeError> {
        let source = record.source();
        let node = self.nodes.entry(path.clone()).or_default();
        if node.has_source(source) {
            return Err(MergeError { source, path });
        }
        match record {
            SourceRecord::Filesystem(r) => node.filesystem = Some(r),
            SourceRecord::Nextcloud(r) => node.nextcloud = Some(r),
            SourceRecord::Ida(r) => node.ida = Some(r),
            SourceRecord::Metax(r) => node.metax = Some(r),
        }
        self.counts.bump(source);
        Ok(())
    }

    /// Fold one collector's whole output into the table.
    pub fn extend<I>(&mut self, records: I) -> Result<(), MergeError>
    where
        I: IntoIterator<Item = (NodePath, SourceRecord)>,
    {
        for (path, record) in records {
            self.insert(path, record)?;
        }
        Ok(())
    }

    pub fn counts(&self) -> SourceCounts {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodePath, &Node)> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&NodePath, &mut Node)> {
        self.nodes.iter_mut()
    }

    pub fn into_nodes(self) -> BTreeMap<NodePath, Node> {
        self.nodes
    }
}
