//! Authenticated HTTP client for the Agora REST API.
//!
//! A [`Client`] pairs a validated base URL with one [`Connection`] (API key
//! or username/password) and a `reqwest` transport. TLS verification is a
//! per-client setting on that transport, never process-wide state. The
//! [`Agora`] facade on top provides the thin REST accessors (projects,
//! folders, folder items).

mod api;
mod client;
mod connection;

pub use api::Agora;
pub use client::{Client, DEFAULT_TIMEOUT, validate_url};
pub use connection::Connection;

/// Errors from the Agora HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no api-key found. Please create an api-key in your Agora user profile")]
    NoApiKey,
}
