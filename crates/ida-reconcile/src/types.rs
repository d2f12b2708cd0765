use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::tags::ErrorTag;
use crate::timestamp::Timestamp;

/// File or folder. Serialized lowercase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Folder,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Folder => "folder",
        }
    }
}

/// Record shape shared by the filesystem, the Nextcloud cache and the
/// replication mirror: `type`, `size` (files only), `modified`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
}

impl EntryRecord {
    pub fn file(size: u64, modified: Timestamp) -> Self {
        Self {
            node_type: NodeType::File,
            size: Some(size),
            modified: Some(modified),
        }
    }

    pub fn folder(modified: Timestamp) -> Self {
        Self {
            node_type: NodeType::Folder,
            size: None,
            modified: Some(modified),
        }
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }
}

/// Frozen-file registry row (IDA).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdaRecord {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub pid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
    pub frozen: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated: Option<Timestamp>,
}

/// Catalog file entry (Metax), identical for both catalog API versions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaxRecord {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub pid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<Timestamp>,
}

/// The four collected stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Filesystem,
    Nextcloud,
    Ida,
    Metax,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Filesystem => "filesystem",
            Source::Nextcloud => "nextcloud",
            Source::Ida => "ida",
            Source::Metax => "metax",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record as emitted by a collector, tagged by its source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceRecord {
    Filesystem(EntryRecord),
    Nextcloud(EntryRecord),
    Ida(IdaRecord),
    Metax(MetaxRecord),
}

impl SourceRecord {
    pub fn source(&self) -> Source {
        match self {
            SourceRecord::Filesystem(_) => Source::Filesystem,
            SourceRecord::Nextcloud(_) => Source::Nextcloud,
            SourceRecord::Ida(_) => Source::Ida,
            SourceRecord::Metax(_) => Source::Metax,
        }
    }
}

/// A merged entry: every store's view of one normalized path plus the
/// comparator's verdict.
///
/// Field order is the report's block order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub errors: BTreeSet<ErrorTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<EntryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nextcloud: Option<EntryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ida: Option<IdaRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metax: Option<MetaxRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<EntryRecord>,
}

impl Node {
    pub fn has_source(&self, source: Source) -> bool {
        match source {
            Source::Filesystem => self.filesystem.is_some(),
            Source::Nextcloud => self.nextcloud.is_some(),
            Source::Ida => self.ida.is_some(),
            Source::Metax => self.metax.is_some(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Registry replication instant, if the file has been replicated.
    pub fn replicated_at(&self) -> Option<Timestamp> {
        self.ida.as_ref().and_then(|r| r.replicated)
    }
}
