//! `homeclip` server entry point.
//!
//! Loads configuration, creates the installation registry, builds the
//! Confluence client, and serves the Axum router until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use homeclip_core::confluence::ConfluenceClient;
use homeclip_core::installation::MemoryInstallationStore;

use homeclip_server::config::ServerConfig;
use homeclip_server::routes::build_router;
use homeclip_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("homeclip starting; installations are kept in memory and lost on restart");

    let client = ConfluenceClient::new(config.http_timeout)
        .context("failed to build Confluence client")?;

    let state = Arc::new(AppState::new(
        Arc::new(MemoryInstallationStore::new()),
        Arc::new(client),
        config.descriptor_path.clone(),
    ));
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    let descriptor = config
        .descriptor_path
        .as_ref()
        .map_or_else(|| "built-in".to_owned(), |p| p.display().to_string());
    info!(addr = %config.bind_addr, descriptor = %descriptor, "homeclip listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("homeclip stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
