//! Connect JWT guard for protected routes.
//!
//! Reads the token from the `jwt` query parameter or an
//! `Authorization: JWT <token>` header, resolves the installation named by
//! its issuer, verifies it with that installation's shared secret, and
//! injects a [`ConnectContext`] into the request extensions.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use homeclip_core::error::AuthError;
use homeclip_core::installation::{InstallationRecord, InstallationStore};
use homeclip_core::jwt::{self, ConnectClaims};

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated Connect request context.
#[derive(Clone)]
pub struct ConnectContext {
    /// Installation the token was verified against.
    pub installation: InstallationRecord,
    /// Verified claims, exactly as sent.
    pub claims: ConnectClaims,
    /// The verified token, whichever way it arrived. The dialog hands it
    /// back to the browser for the follow-up submission.
    pub token: String,
}

impl std::fmt::Debug for ConnectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectContext")
            .field("installation", &self.installation)
            .field("claims", &self.claims)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Pull the raw token out of the query string or `Authorization` header.
fn token_from_request(req: &Request) -> Option<String> {
    let from_query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove("jwt"))
        .filter(|t| !t.is_empty());
    if from_query.is_some() {
        return from_query;
    }

    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("JWT "))
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
}

/// Verify a token against the registry.
///
/// The unverified peek only selects the installation; nothing from it is
/// returned unless the signature checks out.
///
/// # Errors
///
/// Returns [`AuthError`] for any token problem or unknown issuer.
pub async fn authenticate(
    installations: &dyn InstallationStore,
    token: &str,
    now: i64,
) -> Result<ConnectContext, AuthError> {
    let unverified = jwt::decode_unverified(token)?;
    let installation = installations.get(&unverified.iss).await.ok_or_else(|| {
        AuthError::UnknownInstallation {
            client_key: unverified.iss.clone(),
        }
    })?;

    let claims = jwt::verify(token, &installation.shared_secret, now)?;
    Ok(ConnectContext {
        installation,
        claims,
        token: token.to_owned(),
    })
}

/// Axum middleware that rejects requests without a valid Connect JWT.
///
/// # Errors
///
/// Returns `401` with a plain-text reason if authentication fails.
pub async fn connect_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = token_from_request(&req) else {
        tracing::debug!(path = %req.uri().path(), "request without JWT");
        return Err(AuthError::MissingToken.into());
    };

    let now = chrono::Utc::now().timestamp();
    let ctx = match authenticate(state.installations.as_ref(), &token, now).await {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::warn!(path = %req.uri().path(), error = %err, "JWT verification failed");
            return Err(err.into());
        }
    };

    tracing::debug!(client_key = %ctx.installation.client_key, "request authenticated");
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
