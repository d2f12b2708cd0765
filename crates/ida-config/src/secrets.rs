//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`password_env`, `token_env`, ...).
//! - Each CLI resolves secrets once at startup via [`resolve_secrets_for_tool`]
//!   and passes the result into constructors.
//! - `Debug` output redacts every value.
//! - Errors name the missing variable, never a value.
//!
//! # Per-tool requirements
//! | Tool               | Required                                        |
//! |--------------------|-------------------------------------------------|
//! | AUDIT              | database password, catalog credential           |
//! | REPAIR_TIMESTAMPS  | service admin password, catalog credential      |
//! | PURGE_ORPHANS      | database password                               |
//!
//! The catalog credential is the basic-auth password for API version 1 and
//! the bearer token for version 3.

use anyhow::{bail, Result};

use crate::consumption::ToolMode;
use crate::settings::IdaConfig;

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub database_password: Option<String>,
    pub service_admin_password: Option<String>,
    pub catalog_password: Option<String>,
    pub catalog_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "database_password",
                &self.database_password.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "service_admin_password",
                &self.service_admin_password.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "catalog_password",
                &self.catalog_password.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "catalog_token",
                &self.catalog_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Resolve secrets from the process environment.
pub fn resolve_secrets_for_tool(cfg: &IdaConfig, mode: ToolMode) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, mode, |name| std::env::var(name).ok())
}

/// Resolve secrets through `lookup`. Blank values count as unset.
pub fn resolve_secrets_with<F>(
    cfg: &IdaConfig,
    mode: ToolMode,
    lookup: F,
) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let resolve = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
    let require = |var: &str, what: &str| -> Result<String> {
        match resolve(var) {
            Some(v) => Ok(v),
            None => bail!(
                "SECRETS_MISSING mode={}: required env var '{}' ({}) is not set or empty",
                mode.as_str(),
                var,
                what
            ),
        }
    };

    let mut out = ResolvedSecrets::default();

    let needs_database = matches!(mode, ToolMode::Audit | ToolMode::PurgeOrphans);
    let needs_service = mode == ToolMode::RepairTimestamps;
    let needs_catalog = matches!(mode, ToolMode::Audit | ToolMode::RepairTimestamps);

    if needs_database {
        let db = cfg.database()?;
        out.database_password = Some(require(&db.password_env, "database password")?);
    }

    if needs_service {
        let svc = cfg.service()?;
        out.service_admin_password =
            Some(require(&svc.admin_password_env, "service admin password")?);
    }

    if needs_catalog {
        let cat = cfg.catalog()?;
        match cat.version {
            1 => {
                if cat.user.is_none() {
                    bail!("CONFIG_MISSING key=catalog.user (catalog version 1 uses basic auth)");
                }
                let Some(var) = cat.password_env.as_deref() else {
                    bail!("CONFIG_MISSING key=catalog.password_env (catalog version 1)");
                };
                out.catalog_password = Some(require(var, "catalog password")?);
            }
            _ => {
                let Some(var) = cat.token_env.as_deref() else {
                    bail!("CONFIG_MISSING key=catalog.token_env (catalog version 3)");
                };
                out.catalog_token = Some(require(var, "catalog token")?);
            }
        }
    }

    Ok(out)
}
