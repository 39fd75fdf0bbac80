//! Saving submitted text to the user's "My Saved Content" page.
//!
//! The upsert runs three or four Confluence calls in sequence:
//!
//! 1. list personal spaces and take the first
//! 2. look for a page titled [`SAVED_CONTENT_TITLE`] in that space
//! 3. append a block and `PUT` it back with version + 1, or
//! 4. `POST` a new page with an intro heading and the block
//!
//! Any failure stops the sequence. Concurrent saves are last-write-wins; the
//! version check Confluence applies on update is the only conflict guard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::confluence::{ContentApi, NewPage, PageUpdate};
use crate::error::SaveError;
use crate::installation::InstallationRecord;

/// Title of the page content is collected on.
pub const SAVED_CONTENT_TITLE: &str = "My Saved Content";

/// Opening text of a freshly created page.
pub const PAGE_INTRO: &str = "# My Saved Content\n\nThis page contains content I've saved from various Confluence pages.\n\n";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Text submitted from the dialog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Page the dialog was opened from.
    #[serde(default)]
    pub source_page_id: Option<String>,
    /// Space of the source page.
    #[serde(default)]
    pub space_key: Option<String>,
}

impl Submission {
    fn validate(&self) -> Result<(), SaveError> {
        if self.title.trim().is_empty() {
            return Err(SaveError::InvalidSubmission {
                reason: "title must not be empty".to_owned(),
            });
        }
        if self.content.trim().is_empty() {
            return Err(SaveError::InvalidSubmission {
                reason: "content must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// Where the content ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPage {
    pub page_id: String,
    /// Browse URL, `<site>/wiki/spaces/<key>/pages/<id>`.
    pub page_url: String,
    /// `true` if the page did not exist before this save.
    pub created: bool,
}

/// Escape text for the XHTML-based storage representation.
fn escape_storage(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Render one saved block.
#[must_use]
pub fn content_block(submission: &Submission, at: DateTime<Utc>) -> String {
    let source = match (
        non_empty(submission.source_page_id.as_deref()),
        non_empty(submission.space_key.as_deref()),
    ) {
        (Some(page), Some(space)) => format!(
            "*Source: page {} in space {}*\n",
            escape_storage(page),
            escape_storage(space)
        ),
        (Some(page), None) => format!("*Source: page {}*\n", escape_storage(page)),
        _ => String::new(),
    };
    format!(
        "\n## {}\n*Added on {}*\n{source}\n{}\n\n---\n",
        escape_storage(submission.title.trim()),
        at.format(TIMESTAMP_FORMAT),
        escape_storage(&submission.content),
    )
}

/// Browse URL of a page in a space.
#[must_use]
pub fn page_url(installation: &InstallationRecord, space_key: &str, page_id: &str) -> String {
    format!(
        "{}/wiki/spaces/{space_key}/pages/{page_id}",
        installation.site_url()
    )
}

/// Runs the find-or-create upsert against a [`ContentApi`].
#[derive(Clone)]
pub struct SavedContentService {
    api: Arc<dyn ContentApi>,
}

impl std::fmt::Debug for SavedContentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedContentService").finish_non_exhaustive()
    }
}

impl SavedContentService {
    #[must_use]
    pub fn new(api: Arc<dyn ContentApi>) -> Self {
        Self { api }
    }

    /// Append `submission` to the user's saved-content page, creating the
    /// page if needed. `now` stamps the block.
    ///
    /// # Errors
    ///
    /// - [`SaveError::InvalidSubmission`] if title or content is blank
    /// - [`SaveError::NoPersonalSpace`] if the user has no personal space;
    ///   no page is created or updated
    /// - [`SaveError::Transport`] if any Confluence call fails
    pub async fn save(
        &self,
        installation: &InstallationRecord,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> Result<SavedPage, SaveError> {
        submission.validate()?;

        let spaces = self.api.personal_spaces(installation).await?;
        let space_key = spaces
            .into_iter()
            .next()
            .map(|space| space.key)
            .ok_or(SaveError::NoPersonalSpace)?;

        let block = content_block(submission, now);
        let existing = self
            .api
            .find_page(installation, &space_key, SAVED_CONTENT_TITLE)
            .await?;

        let (page, created) = match existing {
            Some(page) => {
                let update = PageUpdate {
                    title: SAVED_CONTENT_TITLE.to_owned(),
                    storage_value: format!("{}{block}", page.storage_value),
                    version_number: page.version_number + 1,
                };
                tracing::debug!(
                    page_id = %page.id,
                    version = update.version_number,
                    "appending to saved content page"
                );
                (
                    self.api.update_page(installation, &page.id, &update).await?,
                    false,
                )
            }
            None => {
                let new_page = NewPage {
                    space_key: space_key.clone(),
                    title: SAVED_CONTENT_TITLE.to_owned(),
                    storage_value: format!("{PAGE_INTRO}{block}"),
                };
                tracing::debug!(space_key = %space_key, "creating saved content page");
                (self.api.create_page(installation, &new_page).await?, true)
            }
        };

        tracing::info!(
            client_key = %installation.client_key,
            space_key = %space_key,
            page_id = %page.id,
            created,
            "content saved"
        );

        Ok(SavedPage {
            page_url: page_url(installation, &space_key, &page.id),
            page_id: page.id,
            created,
        })
    }
}
