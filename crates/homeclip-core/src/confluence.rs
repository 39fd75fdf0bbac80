//! Confluence REST API access.
//!
//! [`ContentApi`] is the seam between the saved-content upsert and the
//! network. [`ConfluenceClient`] implements it over `reqwest`, signing every
//! call with a fresh Connect JWT. There is no retry or backoff: the first
//! failure is returned to the caller.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;
use crate::installation::InstallationRecord;
use crate::jwt;

/// Space listing, filtered to personal spaces.
pub const SPACE_PATH: &str = "/wiki/rest/api/space";
/// Content search, create, and update.
pub const CONTENT_PATH: &str = "/wiki/rest/api/content";

/// Longest error body kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// A Confluence space as returned by the space listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Space {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A page fetched with `expand=body.storage,version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub id: String,
    pub title: String,
    pub version_number: u64,
    /// Body in storage representation.
    pub storage_value: String,
}

/// A page to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub space_key: String,
    pub title: String,
    pub storage_value: String,
}

/// A full replacement of an existing page's title and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdate {
    pub title: String,
    pub storage_value: String,
    /// Must be the current version plus one or Confluence rejects the update.
    pub version_number: u64,
}

/// Identifier of a page returned from create or update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageRef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// The four Confluence operations the add-on needs.
#[async_trait::async_trait]
pub trait ContentApi: Send + Sync + 'static {
    /// List the caller's personal spaces (at most one is requested).
    async fn personal_spaces(
        &self,
        installation: &InstallationRecord,
    ) -> Result<Vec<Space>, TransportError>;

    /// Find a page by exact title in a space.
    async fn find_page(
        &self,
        installation: &InstallationRecord,
        space_key: &str,
        title: &str,
    ) -> Result<Option<RemotePage>, TransportError>;

    /// Create a page.
    async fn create_page(
        &self,
        installation: &InstallationRecord,
        page: &NewPage,
    ) -> Result<PageRef, TransportError>;

    /// Overwrite a page's title and body.
    async fn update_page(
        &self,
        installation: &InstallationRecord,
        page_id: &str,
        update: &PageUpdate,
    ) -> Result<PageRef, TransportError>;
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Results<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize)]
struct WirePage {
    id: String,
    title: String,
    version: WireVersion,
    body: WireBody,
}

#[derive(Deserialize)]
struct WireVersion {
    number: u64,
}

#[derive(Deserialize)]
struct WireBody {
    storage: WireStorage,
}

#[derive(Deserialize)]
struct WireStorage {
    value: String,
}

impl From<WirePage> for RemotePage {
    fn from(page: WirePage) -> Self {
        Self {
            id: page.id,
            title: page.title,
            version_number: page.version.number,
            storage_value: page.body.storage.value,
        }
    }
}

fn storage_body(value: &str) -> serde_json::Value {
    serde_json::json!({
        "storage": {
            "value": value,
            "representation": "storage"
        }
    })
}

// ── Client ───────────────────────────────────────────────────────────

/// `reqwest`-backed [`ContentApi`].
#[derive(Debug, Clone)]
pub struct ConfluenceClient {
    http: reqwest::Client,
}

impl ConfluenceClient {
    /// Build a client whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("homeclip/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { http })
    }

    /// Send one signed request and decode the JSON response.
    async fn call<T: DeserializeOwned>(
        &self,
        installation: &InstallationRecord,
        method: Method,
        api_path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T, TransportError> {
        let (mut url, canonical_path) = request_target(installation, api_path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let token = jwt::outbound_token(
            installation,
            method.as_str(),
            &canonical_path,
            query,
            chrono::Utc::now().timestamp(),
        )?;

        tracing::debug!(method = %method, url = %url, client_key = %installation.client_key, "calling Confluence");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, format!("JWT {token}"))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            tracing::warn!(method = %method, url = %url, status = status.as_u16(), "Confluence returned an error");
            return Err(TransportError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        serde_json::from_str(&text).map_err(|source| TransportError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

/// Resolve the absolute URL for an API path and the path used in `qsh`.
///
/// The `qsh` path is relative to the installation's base URL, so a base URL
/// of `https://x.atlassian.net/wiki` turns `/wiki/rest/api/space` into
/// `/rest/api/space`.
fn request_target(
    installation: &InstallationRecord,
    api_path: &str,
) -> Result<(Url, String), TransportError> {
    let invalid = |reason: String| TransportError::InvalidBaseUrl {
        base_url: installation.base_url.clone(),
        reason,
    };
    let url = Url::parse(&format!("{}{api_path}", installation.site_url()))
        .map_err(|e| invalid(e.to_string()))?;
    let base = Url::parse(&installation.base_url).map_err(|e| invalid(e.to_string()))?;

    let base_path = base.path().trim_end_matches('/');
    let canonical = url
        .path()
        .strip_prefix(base_path)
        .unwrap_or_else(|| url.path())
        .to_owned();
    Ok((url, canonical))
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

#[async_trait::async_trait]
impl ContentApi for ConfluenceClient {
    async fn personal_spaces(
        &self,
        installation: &InstallationRecord,
    ) -> Result<Vec<Space>, TransportError> {
        let page: Results<Space> = self
            .call(
                installation,
                Method::GET,
                SPACE_PATH,
                &[("type", "personal"), ("limit", "1")],
                None,
            )
            .await?;
        Ok(page.results)
    }

    async fn find_page(
        &self,
        installation: &InstallationRecord,
        space_key: &str,
        title: &str,
    ) -> Result<Option<RemotePage>, TransportError> {
        let page: Results<WirePage> = self
            .call(
                installation,
                Method::GET,
                CONTENT_PATH,
                &[
                    ("spaceKey", space_key),
                    ("title", title),
                    ("expand", "body.storage,version"),
                ],
                None,
            )
            .await?;
        Ok(page.results.into_iter().next().map(RemotePage::from))
    }

    async fn create_page(
        &self,
        installation: &InstallationRecord,
        page: &NewPage,
    ) -> Result<PageRef, TransportError> {
        let body = serde_json::json!({
            "type": "page",
            "title": page.title,
            "space": { "key": page.space_key },
            "body": storage_body(&page.storage_value),
        });
        self.call(installation, Method::POST, CONTENT_PATH, &[], Some(body))
            .await
    }

    async fn update_page(
        &self,
        installation: &InstallationRecord,
        page_id: &str,
        update: &PageUpdate,
    ) -> Result<PageRef, TransportError> {
        let body = serde_json::json!({
            "version": { "number": update.version_number },
            "title": update.title,
            "type": "page",
            "body": storage_body(&update.storage_value),
        });
        let path = format!("{CONTENT_PATH}/{}", urlencoding::encode(page_id));
        self.call(installation, Method::PUT, &path, &[], Some(body))
            .await
    }
}
