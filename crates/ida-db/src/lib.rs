//! ida-db
//!
//! PostgreSQL access for the webstore metadata cache and the frozen-file
//! registry. Both live in the same database. All queries are runtime queries
//! with bound parameters; only the configured table prefix is spliced into
//! the SQL text, and it is validated first.

use anyhow::{anyhow, bail, Context, Result};
use ida_config::DatabaseSettings;
use ida_reconcile::{
    frozen_from_stored, normalize_checksum, Cutoff, EntryRecord, IdaRecord, NodePath, NodeType,
    PathLayout, Timestamp,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

pub const ENV_TEST_DB_URL: &str = "IDA_TEST_DATABASE_URL";

/// Webstore mimetype id for directories.
pub const FOLDER_MIMETYPE: i64 = 2;

pub async fn connect(settings: &DatabaseSettings, password: &str) -> Result<PgPool> {
    let opts = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.name)
        .username(&settings.user)
        .password(password);

    PgPoolOptions::new()
        .max_connections(2)
        .connect_with(opts)
        .await
        .with_context(|| {
            format!(
                "failed to connect to Postgres {}:{}/{}",
                settings.host, settings.port, settings.name
            )
        })
}

/// Connect using IDA_TEST_DATABASE_URL. Test helper.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let url = std::env::var(ENV_TEST_DB_URL)
        .with_context(|| format!("missing env var {ENV_TEST_DB_URL}"))?;
    PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")
}

/// Prefixed table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    prefix: String,
}

impl Tables {
    pub fn new(prefix: &str) -> Result<Self> {
        let ok = prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !ok {
            bail!("invalid table prefix '{prefix}': only [a-z0-9_] allowed");
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn filecache(&self) -> String {
        format!("{}filecache", self.prefix)
    }

    pub fn storages(&self) -> String {
        format!("{}storages", self.prefix)
    }

    pub fn frozen_file(&self) -> String {
        format!("{}ida_frozen_file", self.prefix)
    }
}

/// Numeric storage id of the project user's home storage
/// (`storages.id = 'home::<project_user>'`). Missing is fatal.
pub async fn lookup_storage_id(pool: &PgPool, tables: &Tables, project_user: &str) -> Result<i64> {
    let sql = format!(
        "select numeric_id from {} where id = $1",
        tables.storages()
    );
    let key = format!("home::{project_user}");
    let row: Option<(i64,)> = sqlx::query_as::<_, (i64,)>(&sql)
        .bind(&key)
        .fetch_optional(pool)
        .await
        .context("lookup_storage_id failed")?;
    row.map(|(id,)| id)
        .ok_or_else(|| anyhow!("storage id not found for '{key}'"))
}

/// Convert one cache row. The `files` root and the area roots yield `None`.
pub fn webstore_row_to_record(
    layout: &PathLayout,
    path: &str,
    mimetype: i64,
    size: i64,
    mtime: i64,
) -> Result<Option<(NodePath, EntryRecord)>> {
    let Some(node_path) = layout
        .normalize_webstore(path)
        .with_context(|| format!("webstore row '{path}'"))?
    else {
        return Ok(None);
    };
    let modified = Timestamp::from_epoch_seconds(mtime)
        .with_context(|| format!("webstore row '{path}' mtime"))?;
    let record = if mimetype == FOLDER_MIMETYPE {
        EntryRecord::folder(modified)
    } else {
        // Negative sizes mark unknown sizes in the cache; size checks are
        // skipped for such nodes.
        let size = u64::try_from(size).ok();
        if size.is_none() {
            warn!(path = %node_path, "webstore cache row has an unknown size");
        }
        EntryRecord {
            node_type: NodeType::File,
            size,
            modified: Some(modified),
        }
    };
    Ok(Some((node_path, record)))
}

/// Webstore collector: every cached node of the project modified before `T`.
pub async fn fetch_webstore_nodes(
    pool: &PgPool,
    tables: &Tables,
    storage_id: i64,
    layout: &PathLayout,
    cutoff: Cutoff,
) -> Result<Vec<(NodePath, EntryRecord)>> {
    let sql = format!(
        r#"
        select path, mimetype::bigint as mimetype, size::bigint as size, mtime::bigint as mtime
        from {}
        where storage = $1
          and (path = 'files' or path like 'files/%')
          and mtime < $2
        order by path
        "#,
        tables.filecache()
    );
    let rows = sqlx::query(&sql)
        .bind(storage_id)
        .bind(cutoff.at().epoch_seconds())
        .fetch_all(pool)
        .await
        .context("fetch_webstore_nodes failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let path: String = row.try_get("path")?;
        let mimetype: i64 = row.try_get("mimetype")?;
        let size: i64 = row.try_get("size")?;
        let mtime: i64 = row.try_get("mtime")?;
        if let Some(pair) = webstore_row_to_record(layout, &path, mimetype, size, mtime)? {
            out.push(pair);
        }
    }
    debug!(storage_id, collected = out.len(), "webstore rows collected");
    Ok(out)
}

/// Raw registry row; timestamps as stored text.
#[derive(Debug, Clone)]
pub struct RegistryRow {
    pub pathname: String,
    pub size: Option<i64>,
    pub pid: String,
    pub checksum: Option<String>,
    pub modified: Option<String>,
    pub frozen: String,
    pub replicated: Option<String>,
}

fn parse_optional_ts(raw: Option<&str>, what: &str, path: &str) -> Result<Option<Timestamp>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Timestamp::parse(s)
            .map(Some)
            .with_context(|| format!("registry row '{path}' {what}")),
    }
}

/// Convert one registry row. Rows frozen at or after `T` yield `None`.
pub fn registry_row_to_record(
    row: &RegistryRow,
    cutoff: Cutoff,
) -> Result<Option<(NodePath, IdaRecord)>> {
    let path = frozen_from_stored(&row.pathname)
        .with_context(|| format!("registry row '{}'", row.pathname))?;
    let frozen = Timestamp::parse(&row.frozen)
        .with_context(|| format!("registry row '{}' frozen", row.pathname))?;
    if !cutoff.admits(frozen) {
        return Ok(None);
    }
    let size = match row.size {
        None => None,
        Some(s) => Some(
            u64::try_from(s)
                .with_context(|| format!("registry row '{}' negative size {s}", row.pathname))?,
        ),
    };
    let record = IdaRecord {
        node_type: NodeType::File,
        size,
        pid: row.pid.clone(),
        checksum: row.checksum.as_deref().and_then(normalize_checksum),
        modified: parse_optional_ts(row.modified.as_deref(), "modified", &row.pathname)?,
        frozen,
        replicated: parse_optional_ts(row.replicated.as_deref(), "replicated", &row.pathname)?,
    };
    Ok(Some((path, record)))
}

/// Registry collector: frozen files of the project that are neither removed
/// nor cleared and were frozen before `T`.
pub async fn fetch_registry_nodes(
    pool: &PgPool,
    tables: &Tables,
    project: &str,
    cutoff: Cutoff,
) -> Result<Vec<(NodePath, IdaRecord)>> {
    let sql = format!(
        r#"
        select pathname, size::bigint as size, pid, checksum,
               modified::text as modified, frozen::text as frozen,
               replicated::text as replicated
        from {}
        where project = $1
          and removed is null
          and cleared is null
          and frozen is not null
        order by pathname
        "#,
        tables.frozen_file()
    );
    let rows = sqlx::query(&sql)
        .bind(project)
        .fetch_all(pool)
        .await
        .context("fetch_registry_nodes failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let raw = RegistryRow {
            pathname: row.try_get("pathname")?,
            size: row.try_get("size")?,
            pid: row.try_get("pid")?,
            checksum: row.try_get("checksum")?,
            modified: row.try_get("modified")?,
            frozen: row.try_get("frozen")?,
            replicated: row.try_get("replicated")?,
        };
        if let Some(pair) = registry_row_to_record(&raw, cutoff)? {
            out.push(pair);
        }
    }
    debug!(project, collected = out.len(), "registry rows collected");
    Ok(out)
}

/// Delete one cache row keyed by `(storage, path)`. Returns rows deleted.
pub async fn delete_cache_row(
    pool: &PgPool,
    tables: &Tables,
    storage_id: i64,
    raw_path: &str,
) -> Result<u64> {
    let sql = format!(
        "delete from {} where storage = $1 and path = $2",
        tables.filecache()
    );
    let res = sqlx::query(&sql)
        .bind(storage_id)
        .bind(raw_path)
        .execute(pool)
        .await
        .with_context(|| format!("delete_cache_row failed for '{raw_path}'"))?;
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PathLayout {
        PathLayout::new("2000123", "+")
    }

    fn cutoff() -> Cutoff {
        Cutoff::parse("2024-01-01T00:00:00Z").unwrap()
    }

    #[test]
    fn table_prefix_is_validated() {
        assert_eq!(Tables::new("oc_").unwrap().filecache(), "oc_filecache");
        assert_eq!(Tables::new("oc_").unwrap().frozen_file(), "oc_ida_frozen_file");
        assert!(Tables::new("oc; drop table x;").is_err());
    }

    #[test]
    fn webstore_rows_normalize_and_type() {
        let (p, r) =
            webstore_row_to_record(&layout(), "files/2000123+/x.dat", 7, 4, 1_672_531_200)
                .unwrap()
                .unwrap();
        assert_eq!(p.as_str(), "staging/x.dat");
        assert_eq!(r.size, Some(4));
        assert_eq!(r.modified.unwrap().to_string(), "2023-01-01T00:00:00Z");

        let (p, r) = webstore_row_to_record(&layout(), "files/2000123/dir", 2, 4096, 0)
            .unwrap()
            .unwrap();
        assert_eq!(p.as_str(), "frozen/dir");
        assert_eq!(r.node_type, NodeType::Folder);
        assert_eq!(r.size, None);

        assert!(webstore_row_to_record(&layout(), "files", 2, 0, 0).unwrap().is_none());
        assert!(webstore_row_to_record(&layout(), "files/2000123+", 2, 0, 0)
            .unwrap()
            .is_none());
        assert!(webstore_row_to_record(&layout(), "cache/x", 7, 0, 0).is_err());
    }

    #[test]
    fn negative_webstore_size_is_an_unknown_size() {
        let (p, r) = webstore_row_to_record(&layout(), "files/2000123/a.dat", 7, -1, 0)
            .unwrap()
            .unwrap();
        assert_eq!(p.as_str(), "frozen/a.dat");
        assert!(r.is_file());
        assert_eq!(r.size, None);
    }

    fn registry_row(frozen: &str) -> RegistryRow {
        RegistryRow {
            pathname: "/a/b.dat".to_string(),
            size: Some(10),
            pid: "pid-1".to_string(),
            checksum: Some("sha256:ABCD".to_string()),
            modified: Some("2023-06-01T00:00:00Z".to_string()),
            frozen: frozen.to_string(),
            replicated: Some(String::new()),
        }
    }

    #[test]
    fn registry_rows_normalize_checksum_and_blank_replicated() {
        let (p, r) = registry_row_to_record(&registry_row("2023-06-01T00:00:00Z"), cutoff())
            .unwrap()
            .unwrap();
        assert_eq!(p.as_str(), "frozen/a/b.dat");
        assert_eq!(r.checksum.as_deref(), Some("abcd"));
        assert_eq!(r.replicated, None);
    }

    #[test]
    fn registry_row_frozen_at_cutoff_is_dropped() {
        assert!(registry_row_to_record(&registry_row("2024-01-01T00:00:00Z"), cutoff())
            .unwrap()
            .is_none());
        assert!(registry_row_to_record(&registry_row("2023-12-31T23:59:59Z"), cutoff())
            .unwrap()
            .is_some());
    }
}
