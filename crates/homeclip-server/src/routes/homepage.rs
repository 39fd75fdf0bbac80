//! `POST /add-to-homepage`: save submitted text to the user's personal space.
//!
//! Authentication failures are rejected by the guard with `401`. Past the
//! guard, every outcome is `200` and the caller reads `success`: the dialog
//! script and existing clients depend on that contract.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Serialize;

use homeclip_core::saved_content::Submission;

use crate::middleware::ConnectContext;
use crate::state::AppState;

/// Build the submission router. Must sit behind the JWT guard.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/add-to-homepage", post(add_to_homepage))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddToHomepageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AddToHomepageResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            page_id: None,
            page_url: None,
            error: Some(error),
        }
    }
}

async fn add_to_homepage(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<ConnectContext>,
    body: Result<Json<Submission>, JsonRejection>,
) -> Json<AddToHomepageResponse> {
    let submission = match body {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "unreadable submission");
            return Json(AddToHomepageResponse::failure(rejection.body_text()));
        }
    };

    match state
        .saved_content
        .save(&ctx.installation, &submission, chrono::Utc::now())
        .await
    {
        Ok(saved) => Json(AddToHomepageResponse {
            success: true,
            page_id: Some(saved.page_id),
            page_url: Some(saved.page_url),
            error: None,
        }),
        Err(err) => {
            tracing::warn!(
                client_key = %ctx.installation.client_key,
                error = %err,
                "failed to add content to homepage"
            );
            Json(AddToHomepageResponse::failure(err.to_string()))
        }
    }
}
