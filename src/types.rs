//! Session and wire types for authentication

use serde::{Deserialize, Serialize};

/// Authentication tokens (access + refresh), always held as a pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Snapshot of the session as seen by the request interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// No access token: send the request unauthenticated
    Missing,
    /// Access token outside the expiry buffer
    Valid(String),
    /// Access token inside the expiry buffer, undecodable, or empty
    Expiring(AuthTokens),
}

/// What the interceptor does with a request whose refresh failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFailurePolicy {
    /// Send the original request without an Authorization header
    #[default]
    SendUnauthenticated,
    /// Fail the request with `ClientError::AuthenticationRequired`
    Abort,
}

/// Body of `POST users/token/refresh/`
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Success body of the refresh endpoint
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// Present when the server rotates refresh tokens
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Body of `POST users/token/`
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Success body of the login endpoint
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

/// Current wall-clock time in fractional seconds since the Unix epoch
pub(crate) fn unix_now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
