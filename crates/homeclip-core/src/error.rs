//! Error types for `homeclip-core`.
//!
//! Each variant carries enough context to diagnose the problem from a log
//! line. Shared secrets and raw tokens are never included.

/// Authentication failures for inbound Connect requests.
///
/// Every variant maps to HTTP 401 at the server boundary.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token was supplied with the request.
    #[error("no JWT token")]
    MissingToken,

    /// The token is not a structurally valid JWT.
    #[error("malformed JWT: {reason}")]
    Malformed { reason: String },

    /// The token's issuer has no installation record.
    #[error("installation not found for issuer '{client_key}'")]
    UnknownInstallation { client_key: String },

    /// The token header names an algorithm other than `HS256`.
    #[error("unsupported JWT algorithm '{alg}'")]
    UnsupportedAlgorithm { alg: String },

    /// The signature does not match the installation's shared secret.
    #[error("invalid JWT signature")]
    InvalidSignature,

    /// The token's `exp` claim is in the past.
    #[error("JWT expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },
}

/// Failures while talking to the Confluence REST API.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or the response not read.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Confluence answered with a non-success status.
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("failed to parse response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The installation's base URL cannot be used to build request URLs.
    #[error("invalid base URL '{base_url}': {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },

    /// Signing the outbound token failed.
    #[error("failed to sign outbound JWT: {reason}")]
    Token { reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors from saving content to the user's personal space.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// Title or content was empty.
    #[error("invalid submission: {reason}")]
    InvalidSubmission { reason: String },

    /// The space listing returned no personal space for the user.
    #[error("could not find user personal space")]
    NoPersonalSpace,

    /// A Confluence call failed; nothing after it was attempted.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
