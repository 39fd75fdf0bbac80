//! `homeclip` HTTP server.
//!
//! Wires the installation registry, Connect JWT guard, and saved-content
//! service into an Axum router. Confluence calls the lifecycle endpoints and
//! loads the dialog in an iframe; the dialog posts back to
//! `/add-to-homepage`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
