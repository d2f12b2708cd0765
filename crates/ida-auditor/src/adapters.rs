//! Bindings from the store crates to [`Collector`].

use anyhow::{Context, Result};
use ida_catalog::CatalogClient;
use ida_config::{IdaConfig, ResolvedSecrets};
use ida_db::Tables;
use ida_fs::{FilesystemCollector, ReplicationProbe};
use ida_reconcile::{Cutoff, NodePath, PathLayout, Source, SourceRecord};
use sqlx::PgPool;

use crate::{Auditor, Collector};

pub struct FilesystemSource {
    inner: FilesystemCollector,
}

impl FilesystemSource {
    pub fn new(inner: FilesystemCollector) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl Collector for FilesystemSource {
    fn source(&self) -> Source {
        Source::Filesystem
    }

    async fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, SourceRecord)>> {
        Ok(self
            .inner
            .collect(cutoff)?
            .into_iter()
            .map(|(p, r)| (p, SourceRecord::Filesystem(r)))
            .collect())
    }
}

pub struct WebstoreCollector {
    pool: PgPool,
    tables: Tables,
    storage_id: i64,
    layout: PathLayout,
}

impl WebstoreCollector {
    pub fn new(pool: PgPool, tables: Tables, storage_id: i64, layout: PathLayout) -> Self {
        Self {
            pool,
            tables,
            storage_id,
            layout,
        }
    }
}

#[async_trait::async_trait]
impl Collector for WebstoreCollector {
    fn source(&self) -> Source {
        Source::Nextcloud
    }

    async fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, SourceRecord)>> {
        let rows = ida_db::fetch_webstore_nodes(
            &self.pool,
            &self.tables,
            self.storage_id,
            &self.layout,
            cutoff,
        )
        .await?;
        Ok(rows
            .into_iter()
            .map(|(p, r)| (p, SourceRecord::Nextcloud(r)))
            .collect())
    }
}

pub struct RegistryCollector {
    pool: PgPool,
    tables: Tables,
    project: String,
}

impl RegistryCollector {
    pub fn new(pool: PgPool, tables: Tables, project: &str) -> Self {
        Self {
            pool,
            tables,
            project: project.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for RegistryCollector {
    fn source(&self) -> Source {
        Source::Ida
    }

    async fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, SourceRecord)>> {
        let rows =
            ida_db::fetch_registry_nodes(&self.pool, &self.tables, &self.project, cutoff).await?;
        Ok(rows
            .into_iter()
            .map(|(p, r)| (p, SourceRecord::Ida(r)))
            .collect())
    }
}

pub struct CatalogCollector {
    client: CatalogClient,
    project: String,
}

impl CatalogCollector {
    pub fn new(client: CatalogClient, project: &str) -> Self {
        Self {
            client,
            project: project.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for CatalogCollector {
    fn source(&self) -> Source {
        Source::Metax
    }

    async fn collect(&self, cutoff: Cutoff) -> Result<Vec<(NodePath, SourceRecord)>> {
        let rows = self.client.collect(&self.project, cutoff).await?;
        Ok(rows
            .into_iter()
            .map(|(p, r)| (p, SourceRecord::Metax(r)))
            .collect())
    }
}

/// Wire every store of `project` from configuration: filesystem, webstore,
/// registry and catalog, in that order, plus the replication probe.
pub async fn build_auditor(
    cfg: &IdaConfig,
    secrets: &ResolvedSecrets,
    project: &str,
) -> Result<Auditor> {
    let storage = cfg.storage()?;
    let db = cfg.database()?;
    let layout = PathLayout::new(project, cfg.staging_folder_suffix.as_str());
    let project_user = cfg.project_user(project);

    let password = secrets
        .database_password
        .as_deref()
        .context("database password was not resolved")?;
    let pool = ida_db::connect(db, password).await?;
    let tables = Tables::new(&db.table_prefix)?;
    let storage_id = ida_db::lookup_storage_id(&pool, &tables, &project_user).await?;

    let catalog = CatalogClient::from_settings(cfg.catalog()?, secrets)
        .context("catalog client setup failed")?;

    let fs = FilesystemCollector::new(&storage.data_root, &project_user, layout.clone());
    let probe = ReplicationProbe::new(storage.replication_root.clone(), project);

    Ok(Auditor::new(project, Box::new(probe))
        .with_collector(Box::new(FilesystemSource::new(fs)))
        .with_collector(Box::new(WebstoreCollector::new(
            pool.clone(),
            tables.clone(),
            storage_id,
            layout,
        )))
        .with_collector(Box::new(RegistryCollector::new(pool, tables, project)))
        .with_collector(Box::new(CatalogCollector::new(catalog, project))))
}
