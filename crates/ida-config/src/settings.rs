//! Typed view of the merged configuration.
//!
//! Every section is optional at parse time; each tool asks only for the
//! sections it needs and gets a `CONFIG_MISSING` error naming the section
//! otherwise.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

fn default_user_prefix() -> String {
    "PSO_".to_string()
}

fn default_staging_suffix() -> String {
    "+".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_table_prefix() -> String {
    "oc_".to_string()
}

fn default_page_size() -> u32 {
    10_000
}

fn default_catalog_version() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdaConfig {
    /// Filesystem and webstore user name is `<prefix><project>`.
    #[serde(default = "default_user_prefix")]
    pub project_user_prefix: String,
    /// Staging area root is `<project><suffix>`.
    #[serde(default = "default_staging_suffix")]
    pub staging_folder_suffix: String,
    #[serde(default)]
    pub storage: Option<StorageSettings>,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub service: Option<ServiceSettings>,
    #[serde(default)]
    pub catalog: Option<CatalogSettings>,
    #[serde(default)]
    pub audit: Option<AuditSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub data_root: PathBuf,
    pub replication_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password_env: String,
    /// Webstore table name prefix.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    pub api_url: String,
    pub admin_user: String,
    pub admin_password_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub url: String,
    /// Catalog API version: 1 or 3.
    #[serde(default = "default_catalog_version")]
    pub version: u8,
    /// This service's storage identifier in the catalog.
    pub storage_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    pub report_root: PathBuf,
}

impl IdaConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: IdaConfig =
            serde_json::from_value(config_json.clone()).context("CONFIG_INVALID")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.staging_folder_suffix.is_empty() {
            bail!("CONFIG_INVALID: staging_folder_suffix must not be empty");
        }
        if let Some(cat) = &self.catalog {
            if cat.version != 1 && cat.version != 3 {
                bail!(
                    "CONFIG_INVALID: catalog.version must be 1 or 3, got {}",
                    cat.version
                );
            }
            if cat.page_size == 0 {
                bail!("CONFIG_INVALID: catalog.page_size must be positive");
            }
        }
        Ok(())
    }

    /// The owning user of a project's storage, e.g. `PSO_2000123`.
    pub fn project_user(&self, project: &str) -> String {
        format!("{}{}", self.project_user_prefix, project)
    }

    pub fn storage(&self) -> Result<&StorageSettings> {
        self.storage.as_ref().context("CONFIG_MISSING section=storage")
    }

    pub fn database(&self) -> Result<&DatabaseSettings> {
        self.database.as_ref().context("CONFIG_MISSING section=database")
    }

    pub fn service(&self) -> Result<&ServiceSettings> {
        self.service.as_ref().context("CONFIG_MISSING section=service")
    }

    pub fn catalog(&self) -> Result<&CatalogSettings> {
        self.catalog.as_ref().context("CONFIG_MISSING section=catalog")
    }

    pub fn audit(&self) -> Result<&AuditSettings> {
        self.audit.as_ref().context("CONFIG_MISSING section=audit")
    }
}
