//! Error types for marks-core

use thiserror::Error;

/// Result type alias using marks-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the bookmarks API
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure (connection refused, TLS, body decode)
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response; carries the message extracted from the body
    #[error("{0}")]
    Api(String),

    /// No API base URL or no session token available
    #[error("Missing API URL or auth token")]
    MissingCredentials,

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
