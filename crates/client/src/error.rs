//! Error types for the products API client

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the client error
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Client error types.
///
/// A non-2xx status is never an error at this level: the gateway hands every
/// response back and callers inspect `status` themselves.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Request to {path} timed out after {after:?}")]
    Timeout { path: String, after: Duration },

    #[error("Transport error for {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Unexpected status {status} from {path}")]
    UnexpectedStatus { status: u16, path: String },

    #[error("Response body did not match the expected type: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether this error is a request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }
}
