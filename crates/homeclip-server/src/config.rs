//! Server configuration for `homeclip`.
//!
//! Loaded from environment variables with defaults suitable for local
//! development. `PORT` alone is enough to run on most hosting platforms.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`).
    pub log_level: String,
    /// Descriptor file served at `/atlassian-connect.json`. `None` serves
    /// the copy compiled into the binary.
    pub descriptor_path: Option<PathBuf>,
    /// Per-request timeout for calls to Confluence.
    pub http_timeout: Duration,
}

const DEFAULT_PORT: u16 = 3000;

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// - `PORT`: port to listen on, binds `0.0.0.0`
    /// - `HOMECLIP_BIND_ADDR`: full bind address, overrides `PORT` (default `127.0.0.1:3000`)
    /// - `HOMECLIP_LOG_LEVEL`: log filter (default `info`)
    /// - `HOMECLIP_DESCRIPTOR_PATH`: descriptor file to serve instead of the built-in one
    /// - `HOMECLIP_HTTP_TIMEOUT_SECS`: Confluence request timeout (default `30`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        // Priority: HOMECLIP_BIND_ADDR > PORT > default.
        let bind_addr = if let Some(addr) = var("HOMECLIP_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
        } else if let Some(port) = var("PORT") {
            let port: u16 = port.parse().unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let log_level = var("HOMECLIP_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let descriptor_path = var("HOMECLIP_DESCRIPTOR_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let http_timeout = Duration::from_secs(
            var("HOMECLIP_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        );

        Self {
            bind_addr,
            log_level,
            descriptor_path,
            http_timeout,
        }
    }
}
