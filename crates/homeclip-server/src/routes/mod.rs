//! HTTP routes and router assembly.

pub mod dialog;
pub mod homepage;
pub mod lifecycle;

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware as axum_mw};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::connect_auth_middleware;
use crate::state::AppState;

/// Descriptor compiled into the binary, served unless
/// `HOMECLIP_DESCRIPTOR_PATH` points elsewhere.
pub const DESCRIPTOR: &str = include_str!("../../atlassian-connect.json");

/// Build the full router: public lifecycle and descriptor routes, plus the
/// JWT-guarded dialog and submission routes.
///
/// No `X-Frame-Options` header is set: Confluence renders the dialog in an
/// iframe.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(dialog::router())
        .merge(homepage::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            connect_auth_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let router = match &state.descriptor_path {
        Some(path) => Router::new().route_service("/atlassian-connect.json", ServeFile::new(path)),
        None => Router::new().route("/atlassian-connect.json", get(descriptor)),
    };

    router
        .route("/health", get(health))
        .merge(lifecycle::router())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// `GET /atlassian-connect.json` from the built-in copy.
async fn descriptor() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], DESCRIPTOR)
}

/// `GET /health`: liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
