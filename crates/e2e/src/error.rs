//! Error types for the e2e suite

use storecheck_client::ApiError;
use thiserror::Error;

use crate::validate::ShapeError;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Stub server failed to start: {0}")]
    ServerStartup(String),

    #[error("Stub server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Fixture error in {path}: {reason}")]
    Fixture { path: String, reason: String },

    #[error("Unknown environment '{name}' (available: {available})")]
    UnknownEnvironment { name: String, available: String },

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Shape violation: {0}")]
    Shape(#[from] ShapeError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Fail with `message` unless `condition` holds
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> E2eResult<()> {
    if condition {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(message()))
    }
}
