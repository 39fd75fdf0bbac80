//! Installation records and the tenant registry.
//!
//! Confluence posts an installation payload to `/installed` when a site
//! admin adds the app, and to `/uninstalled` when it is removed. The
//! [`InstallationStore`] keeps one [`InstallationRecord`] per client key for
//! the auth guard and the lifecycle routes; re-installing overwrites the old
//! record.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One installed instance of the app on one Confluence site.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    /// Tenant identifier. Inbound tokens carry it as `iss`.
    #[serde(default)]
    pub client_key: String,
    /// The app key from the descriptor. Outbound tokens carry it as `iss`.
    #[serde(default)]
    pub key: String,
    /// Site base URL, e.g. `https://example.atlassian.net`.
    #[serde(default)]
    pub base_url: String,
    /// HS256 secret shared between the site and the app.
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl std::fmt::Debug for InstallationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationRecord")
            .field("client_key", &self.client_key)
            .field("key", &self.key)
            .field("base_url", &self.base_url)
            .field("shared_secret", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl InstallationRecord {
    /// Check that the fields needed to authenticate and call back are present.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing field.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("clientKey", &self.client_key),
            ("key", &self.key),
            ("baseUrl", &self.base_url),
            ("sharedSecret", &self.shared_secret),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("missing '{name}' in installation payload"));
            }
        }
        Ok(())
    }

    /// Site root used to build REST and browse URLs.
    ///
    /// Trailing slashes are dropped, as is a trailing `/wiki` context path,
    /// so both `https://x.atlassian.net` and `https://x.atlassian.net/wiki/`
    /// yield `https://x.atlassian.net`.
    #[must_use]
    pub fn site_url(&self) -> &str {
        let trimmed = self.base_url.trim_end_matches('/');
        trimmed.strip_suffix("/wiki").unwrap_or(trimmed)
    }
}

/// Registry of installations keyed by client key.
///
/// Handlers and the auth guard receive it as `Arc<dyn InstallationStore>`,
/// so a durable implementation can replace [`MemoryInstallationStore`]
/// without touching them.
#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Look up the installation for a client key.
    async fn get(&self, client_key: &str) -> Option<InstallationRecord>;

    /// Store a record under its client key, replacing any previous one.
    async fn set(&self, record: InstallationRecord);

    /// Remove the record for a client key. Returns whether one existed.
    async fn delete(&self, client_key: &str) -> bool;
}

/// Process-local registry. Nothing survives a restart, so after a redeploy
/// every tenant has to reinstall the app.
///
/// Concurrent writes for one client key are serialized by the lock; the
/// last one wins.
#[derive(Default)]
pub struct MemoryInstallationStore {
    records: RwLock<HashMap<String, InstallationRecord>>,
}

impl MemoryInstallationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryInstallationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryInstallationStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl InstallationStore for MemoryInstallationStore {
    async fn get(&self, client_key: &str) -> Option<InstallationRecord> {
        self.records.read().await.get(client_key).cloned()
    }

    async fn set(&self, record: InstallationRecord) {
        let mut records = self.records.write().await;
        records.insert(record.client_key.clone(), record);
    }

    async fn delete(&self, client_key: &str) -> bool {
        self.records.write().await.remove(client_key).is_some()
    }
}
