//! Core library for `homeclip`, a Confluence Cloud add-on that saves pasted
//! text to a "My Saved Content" page in the user's personal space.
//!
//! # Modules
//!
//! - [`installation`]: installation records and the tenant registry
//! - [`jwt`]: Atlassian Connect JWT encoding, verification, and `qsh`
//! - [`confluence`]: the [`confluence::ContentApi`] trait and its REST client
//! - [`saved_content`]: the find-or-create page upsert
//! - [`error`]: error types shared by the modules above

pub mod confluence;
pub mod error;
pub mod installation;
pub mod jwt;
pub mod saved_content;
