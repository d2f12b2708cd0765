//! ida-catalog
//!
//! HTTP client for the external metadata catalog: paged listing of a
//! project's frozen files and single-file timestamp updates.

use std::fmt;

use ida_config::{CatalogSettings, ResolvedSecrets};
use ida_reconcile::{Cutoff, MetaxRecord, NodePath};
use tracing::debug;

mod api;

pub use api::{
    CatalogApi, CatalogEntry, CatalogTimestamps, CatalogVersion, MetaxV1, MetaxV3, UpdateMethod,
    UpdateRequest,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum CatalogError {
    /// Network or transport failure.
    Transport(String),
    /// The catalog answered with a non-2xx status.
    Status { status: u16, url: String, body: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// Missing or inconsistent configuration.
    Config(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Transport(msg) => write!(f, "catalog transport error: {msg}"),
            CatalogError::Status { status, url, body } => {
                write!(f, "catalog returned HTTP {status} for {url}: {body}")
            }
            CatalogError::Decode(msg) => write!(f, "catalog decode error: {msg}"),
            CatalogError::Config(msg) => write!(f, "catalog config error: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        CatalogError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum CatalogAuth {
    Basic { user: String, password: String },
    Token(String),
}

impl fmt::Debug for CatalogAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogAuth::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"<REDACTED>")
                .finish(),
            CatalogAuth::Token(_) => f.write_str("Token(<REDACTED>)"),
        }
    }
}

/// Catalog client bound to one API version and this service's storage id.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    api: Box<dyn CatalogApi>,
    auth: CatalogAuth,
    storage_id: String,
    page_size: u32,
}

impl CatalogClient {
    pub fn new(
        base_url: &str,
        version: CatalogVersion,
        storage_id: &str,
        page_size: u32,
        auth: CatalogAuth,
    ) -> Result<Self, CatalogError> {
        if page_size == 0 {
            return Err(CatalogError::Config("page size must be positive".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api: version.strategy(),
            auth,
            storage_id: storage_id.to_string(),
            page_size,
        })
    }

    /// Build from configuration and the secrets resolved at startup.
    pub fn from_settings(
        settings: &CatalogSettings,
        secrets: &ResolvedSecrets,
    ) -> Result<Self, CatalogError> {
        let version = CatalogVersion::from_number(settings.version)?;
        let auth = match version {
            CatalogVersion::V1 => CatalogAuth::Basic {
                user: settings
                    .user
                    .clone()
                    .ok_or_else(|| CatalogError::Config("catalog.user missing".to_string()))?,
                password: secrets.catalog_password.clone().ok_or_else(|| {
                    CatalogError::Config("catalog password unresolved".to_string())
                })?,
            },
            CatalogVersion::V3 => CatalogAuth::Token(
                secrets
                    .catalog_token
                    .clone()
                    .ok_or_else(|| CatalogError::Config("catalog token unresolved".to_string()))?,
            ),
        };
        Self::new(
            &settings.url,
            version,
            &settings.storage_id,
            settings.page_size,
            auth,
        )
    }

    pub fn version(&self) -> CatalogVersion {
        self.api.version()
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            CatalogAuth::Basic { user, password } => req.basic_auth(user, Some(password)),
            CatalogAuth::Token(token) => req.header("Authorization", format!("Token {token}")),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &str) -> Result<String, CatalogError> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(body)
    }

    /// One page of the project's file listing.
    pub async fn fetch_page(
        &self,
        project: &str,
        offset: u64,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let url = format!("{}/files", self.base_url);
        let query = self
            .api
            .list_query(project, &self.storage_id, self.page_size, offset);
        let body = self.send(self.http.get(&url).query(&query), &url).await?;
        self.api.decode_page(&body)
    }

    /// Lazy page sequence over the project's file listing.
    pub fn pager<'a>(&'a self, project: &'a str) -> CatalogPager<'a> {
        CatalogPager {
            client: self,
            project,
            offset: 0,
            done: false,
        }
    }

    /// Catalog collector: every non-removed file recorded before `T`.
    pub async fn collect(
        &self,
        project: &str,
        cutoff: Cutoff,
    ) -> Result<Vec<(NodePath, MetaxRecord)>, CatalogError> {
        let mut out = Vec::new();
        let mut pager = self.pager(project);
        while let Some(page) = pager.next_page().await? {
            for entry in page {
                if entry.removed {
                    continue;
                }
                if entry.recorded_at().is_some_and(|ts| !cutoff.admits(ts)) {
                    continue;
                }
                out.push((entry.path, entry.record));
            }
        }
        debug!(
            project,
            listed = pager.offset(),
            collected = out.len(),
            "catalog files collected"
        );
        Ok(out)
    }

    /// Overwrite one file's modified and/or frozen timestamp in a single
    /// request.
    pub async fn update_timestamps(
        &self,
        pid: &str,
        timestamps: &CatalogTimestamps,
    ) -> Result<(), CatalogError> {
        if timestamps.is_empty() {
            return Err(CatalogError::Config(format!(
                "timestamp update for {pid} carries no fields"
            )));
        }
        let req = self.api.timestamp_update(&self.storage_id, pid, timestamps);
        let url = format!("{}{}", self.base_url, req.path);
        let builder = match req.method {
            UpdateMethod::Patch => self.http.patch(&url),
            UpdateMethod::Post => self.http.post(&url),
        };
        self.send(builder.json(&req.body), &url).await?;
        Ok(())
    }
}

/// Offset pager over `GET /files`. A page shorter than the page size is the
/// last one; no total-count header is assumed.
pub struct CatalogPager<'a> {
    client: &'a CatalogClient,
    project: &'a str,
    offset: u64,
    done: bool,
}

impl CatalogPager<'_> {
    pub async fn next_page(&mut self) -> Result<Option<Vec<CatalogEntry>>, CatalogError> {
        if self.done {
            return Ok(None);
        }
        let page = self.client.fetch_page(self.project, self.offset).await?;
        let limit = u64::from(self.client.page_size);
        let len = page.len() as u64;
        if len < limit {
            self.done = true;
        }
        self.offset += len;
        if page.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Entries listed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
