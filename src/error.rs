//! Error types for the platform clients.

use thiserror::Error;

/// Crate error type.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A remote endpoint returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The credential endpoint answered but refused to issue credentials.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// The real-time feed could not be opened or failed mid-stream.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
