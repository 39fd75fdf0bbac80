//! Shared application state for the `homeclip` server.
//!
//! One [`AppState`] is built at startup and shared across handlers via
//! `Arc`. Both the registry and the Confluence client are injected, so tests
//! can swap in a fake [`ContentApi`].

use std::path::PathBuf;
use std::sync::Arc;

use homeclip_core::confluence::ContentApi;
use homeclip_core::installation::InstallationStore;
use homeclip_core::saved_content::SavedContentService;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Installation records keyed by client key.
    pub installations: Arc<dyn InstallationStore>,
    /// Find-or-create upsert of the saved-content page.
    pub saved_content: SavedContentService,
    /// Descriptor file to serve instead of the built-in one.
    pub descriptor_path: Option<PathBuf>,
}

impl AppState {
    #[must_use]
    pub fn new(
        installations: Arc<dyn InstallationStore>,
        content_api: Arc<dyn ContentApi>,
        descriptor_path: Option<PathBuf>,
    ) -> Self {
        Self {
            installations,
            saved_content: SavedContentService::new(content_api),
            descriptor_path,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("descriptor_path", &self.descriptor_path)
            .finish_non_exhaustive()
    }
}
