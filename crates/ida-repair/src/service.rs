//! Client for the service's own admin API.

use anyhow::{bail, Context, Result};
use ida_config::{ResolvedSecrets, ServiceSettings};
use ida_reconcile::{NodePath, Timestamp};
use serde_json::{json, Value};

/// Basic-auth client for `/repairNodeTimestamp` and `/files/<pid>`.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl ServiceClient {
    pub fn new(base_url: &str, user: &str, password: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn from_settings(settings: &ServiceSettings, secrets: &ResolvedSecrets) -> Result<Self> {
        let password = secrets
            .service_admin_password
            .as_deref()
            .context("service admin password was not resolved")?;
        Ok(Self::new(&settings.api_url, &settings.admin_user, password))
    }

    async fn post(&self, path: &str, body: Value) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("service request failed: POST {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("service returned HTTP {status} for POST {url}: {text}");
        }
        Ok(())
    }

    /// Set the webstore's modified time of one node.
    pub async fn repair_node_timestamp(&self, path: &NodePath, modified: Timestamp) -> Result<()> {
        self.post(
            "/repairNodeTimestamp",
            json!({ "pathname": path.as_str(), "modified": modified.to_string() }),
        )
        .await
    }

    /// Set the registry's modified time of one frozen file.
    pub async fn update_frozen_file_modified(&self, pid: &str, modified: Timestamp) -> Result<()> {
        self.post(
            &format!("/files/{pid}"),
            json!({ "modified": modified.to_string() }),
        )
        .await
    }
}
