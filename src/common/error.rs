//! Error types for strata

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Snapshot Errors ===
    #[error("Malformed segment record: {0}")]
    MalformedSegment(String),

    #[error("Malformed rule: {0}")]
    MalformedRule(String),

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    // === Collaborator Errors ===
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Command dispatch failed on {server}: {reason}")]
    DispatchFailed { server: String, reason: String },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Retryable means a later coordination cycle may succeed with no
    /// operator action: collaborator and transport failures qualify,
    /// malformed input does not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ConnectionFailed(_)
                | Error::Http(_)
                | Error::Catalog(_)
                | Error::Discovery(_)
                | Error::DispatchFailed { .. }
        )
    }

    /// Convert to HTTP status code for the admin API
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::UnknownServer(_) => StatusCode::NOT_FOUND,
            Error::InvalidConfig(_) | Error::MalformedSegment(_) | Error::MalformedRule(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::Catalog(_) | Error::Discovery(_) | Error::ConnectionFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
