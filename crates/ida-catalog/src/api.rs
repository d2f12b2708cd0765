//! Catalog API strategies.
//!
//! The catalog exists in two API versions with different query parameters,
//! field names and update endpoints. Each version is a [`CatalogApi`]
//! implementation selected once at startup; both decode to the same
//! [`MetaxRecord`].

use ida_reconcile::{
    frozen_from_stored, normalize_checksum, MetaxRecord, NodePath, NodeType, Timestamp,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogVersion {
    V1,
    V3,
}

impl CatalogVersion {
    pub fn from_number(n: u8) -> Result<Self, CatalogError> {
        match n {
            1 => Ok(Self::V1),
            3 => Ok(Self::V3),
            other => Err(CatalogError::Config(format!(
                "unsupported catalog version {other}"
            ))),
        }
    }

    pub fn strategy(self) -> Box<dyn CatalogApi> {
        match self {
            Self::V1 => Box::new(MetaxV1),
            Self::V3 => Box::new(MetaxV3),
        }
    }
}

/// Timestamps to overwrite on one catalog file. Absent fields are left
/// untouched, so both repairs for a file go out in one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogTimestamps {
    pub modified: Option<Timestamp>,
    pub frozen: Option<Timestamp>,
}

impl CatalogTimestamps {
    pub fn is_empty(&self) -> bool {
        self.modified.is_none() && self.frozen.is_none()
    }

    fn insert_into(&self, obj: &mut Map<String, Value>, modified_key: &str, frozen_key: &str) {
        if let Some(m) = self.modified {
            obj.insert(modified_key.to_string(), Value::String(m.to_string()));
        }
        if let Some(f) = self.frozen {
            obj.insert(frozen_key.to_string(), Value::String(f.to_string()));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Post,
    Patch,
}

/// A version-specific update call, relative to the catalog base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub method: UpdateMethod,
    pub path: String,
    pub body: Value,
}

/// One decoded catalog file entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub path: NodePath,
    pub removed: bool,
    pub record: MetaxRecord,
}

impl CatalogEntry {
    /// The instant the cut-off is applied to: frozen, else modified.
    pub fn recorded_at(&self) -> Option<Timestamp> {
        self.record.frozen.or(self.record.modified)
    }
}

pub trait CatalogApi: Send + Sync {
    fn version(&self) -> CatalogVersion;

    /// Query parameters for one `GET /files` page.
    fn list_query(
        &self,
        project: &str,
        storage_id: &str,
        limit: u32,
        offset: u64,
    ) -> Vec<(&'static str, String)>;

    /// Decode one page body.
    fn decode_page(&self, body: &str) -> Result<Vec<CatalogEntry>, CatalogError>;

    fn timestamp_update(
        &self,
        storage_id: &str,
        pid: &str,
        timestamps: &CatalogTimestamps,
    ) -> UpdateRequest;
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

fn parse_ts(raw: Option<&str>, what: &str, path: &str) -> Result<Option<Timestamp>, CatalogError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Timestamp::parse(s)
            .map(Some)
            .map_err(|e| CatalogError::Decode(format!("{path}: {what}: {e}"))),
    }
}

fn parse_path(raw: &str) -> Result<NodePath, CatalogError> {
    frozen_from_stored(raw).map_err(|e| CatalogError::Decode(e.to_string()))
}

/// `removed` is a boolean in V1 and a timestamp-or-null in V3.
fn is_removed(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Version 1
// ---------------------------------------------------------------------------

pub struct MetaxV1;

#[derive(Debug, Deserialize)]
struct V1Checksum {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V1File {
    identifier: String,
    file_path: String,
    byte_size: Option<u64>,
    checksum: Option<V1Checksum>,
    file_modified: Option<String>,
    file_frozen: Option<String>,
    #[serde(default)]
    removed: Value,
}

impl CatalogApi for MetaxV1 {
    fn version(&self) -> CatalogVersion {
        CatalogVersion::V1
    }

    fn list_query(
        &self,
        project: &str,
        storage_id: &str,
        limit: u32,
        offset: u64,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("project_identifier", project.to_string()),
            ("file_storage", storage_id.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]
    }

    fn decode_page(&self, body: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let page: Page<V1File> =
            serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
        page.results
            .into_iter()
            .map(|f| {
                let path = parse_path(&f.file_path)?;
                Ok(CatalogEntry {
                    removed: is_removed(&f.removed),
                    record: MetaxRecord {
                        node_type: NodeType::File,
                        size: f.byte_size,
                        pid: f.identifier,
                        checksum: f
                            .checksum
                            .and_then(|c| c.value)
                            .as_deref()
                            .and_then(normalize_checksum),
                        modified: parse_ts(
                            f.file_modified.as_deref(),
                            "file_modified",
                            &f.file_path,
                        )?,
                        frozen: parse_ts(f.file_frozen.as_deref(), "file_frozen", &f.file_path)?,
                    },
                    path,
                })
            })
            .collect()
    }

    fn timestamp_update(
        &self,
        _storage_id: &str,
        pid: &str,
        timestamps: &CatalogTimestamps,
    ) -> UpdateRequest {
        let mut body = Map::new();
        timestamps.insert_into(&mut body, "file_modified", "file_frozen");
        UpdateRequest {
            method: UpdateMethod::Patch,
            path: format!("/files/{pid}"),
            body: Value::Object(body),
        }
    }
}

// ---------------------------------------------------------------------------
// Version 3
// ---------------------------------------------------------------------------

pub struct MetaxV3;

#[derive(Debug, Deserialize)]
struct V3File {
    storage_identifier: String,
    pathname: String,
    size: Option<u64>,
    checksum: Option<String>,
    modified: Option<String>,
    frozen: Option<String>,
    #[serde(default)]
    removed: Value,
}

impl CatalogApi for MetaxV3 {
    fn version(&self) -> CatalogVersion {
        CatalogVersion::V3
    }

    fn list_query(
        &self,
        project: &str,
        storage_id: &str,
        limit: u32,
        offset: u64,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("csc_project", project.to_string()),
            ("storage_service", storage_id.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]
    }

    fn decode_page(&self, body: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let page: Page<V3File> =
            serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
        page.results
            .into_iter()
            .map(|f| {
                let path = parse_path(&f.pathname)?;
                Ok(CatalogEntry {
                    removed: is_removed(&f.removed),
                    record: MetaxRecord {
                        node_type: NodeType::File,
                        size: f.size,
                        pid: f.storage_identifier,
                        checksum: f.checksum.as_deref().and_then(normalize_checksum),
                        modified: parse_ts(f.modified.as_deref(), "modified", &f.pathname)?,
                        frozen: parse_ts(f.frozen.as_deref(), "frozen", &f.pathname)?,
                    },
                    path,
                })
            })
            .collect()
    }

    fn timestamp_update(
        &self,
        storage_id: &str,
        pid: &str,
        timestamps: &CatalogTimestamps,
    ) -> UpdateRequest {
        let mut item = Map::new();
        item.insert("storage_service".to_string(), json!(storage_id));
        item.insert("storage_identifier".to_string(), json!(pid));
        timestamps.insert_into(&mut item, "modified", "frozen");
        UpdateRequest {
            method: UpdateMethod::Post,
            path: "/files/patch-many".to_string(),
            body: Value::Array(vec![Value::Object(item)]),
        }
    }
}
