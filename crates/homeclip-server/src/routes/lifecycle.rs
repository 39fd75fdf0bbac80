//! Connect lifecycle callbacks: `/installed` and `/uninstalled`.
//!
//! Confluence posts the installation payload to these when a site admin
//! installs or removes the app. Records are keyed by `clientKey`; a second
//! install for the same key replaces the first.
//!
//! Neither callback is authenticated. Anyone who can reach the server and
//! knows a tenant's client key can replace its shared secret and base URL
//! with `/installed`, or drop it with `/uninstalled`. Deployments that need
//! more must restrict these paths in front of the server.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use homeclip_core::installation::InstallationRecord;

use crate::error::AppError;
use crate::state::AppState;

/// Build the lifecycle router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/installed", post(installed))
        .route("/uninstalled", post(uninstalled))
}

/// The part of the uninstall payload we need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallPayload {
    pub client_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// `POST /installed`: store or replace the installation record.
async fn installed(
    State(state): State<Arc<AppState>>,
    Json(record): Json<InstallationRecord>,
) -> Result<(StatusCode, &'static str), AppError> {
    record.validate().map_err(AppError::BadRequest)?;
    info!(client_key = %record.client_key, base_url = %record.base_url, "app installed");
    state.installations.set(record).await;
    Ok((StatusCode::OK, "OK"))
}

/// `POST /uninstalled`: forget the installation. Unknown keys are ignored.
async fn uninstalled(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UninstallPayload>,
) -> (StatusCode, &'static str) {
    let removed = state.installations.delete(&payload.client_key).await;

    info!(
        client_key = %payload.client_key,
        base_url = payload.base_url.as_deref().unwrap_or(""),
        removed,
        "app uninstalled"
    );
    (StatusCode::OK, "OK")
}
