//! Error types for the TravelCompanion client

use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Token decode error: {0}")]
    TokenDecode(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Refresh failed and the client is configured not to send unauthenticated requests
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Why a refresh exchange failed
///
/// Cloneable so every caller waiting on a shared refresh receives the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no session to refresh")]
    NoSession,

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Create error from a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Authentication(format!("status {status}: {message}")),
            code => Self::Server {
                status: code,
                message,
            },
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
