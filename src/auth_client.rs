//! Authentication client with session persistence and inline token refresh

use crate::error::{ClientError, RefreshError, Result};
use crate::token_store::{access_expires_within, TokenStore};
use crate::types::*;
use async_singleflight::Group;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Singleflight key shared by every refresh of one client's session
const REFRESH_FLIGHT_KEY: &str = "session-refresh";

/// Macro to check HTTP response status and return error if not successful
macro_rules! check_response {
    ($response:expr) => {
        if !$response.status().is_success() {
            let status = $response.status();
            let text = $response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, text));
        }
    };
}

/// Configuration for the authentication and API clients
#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    /// API root, e.g. `http://localhost:8000/api/`
    pub base_url: String,

    /// Login endpoint, relative to `base_url`
    pub token_path: String,

    /// Refresh endpoint, relative to `base_url`
    pub refresh_path: String,

    /// Refresh threshold in seconds (refresh when this many seconds before expiry)
    /// Default: 60 seconds
    pub refresh_before_expiry_secs: i64,

    /// What to do with a request whose refresh failed
    pub refresh_failure_policy: RefreshFailurePolicy,

    /// Store the refresh token returned by a rotating server instead of keeping the old one
    pub adopt_rotated_refresh_token: bool,

    /// Per-request timeout for every HTTP call, none by default
    pub request_timeout: Option<Duration>,
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            token_path: "users/token/".to_string(),
            refresh_path: "users/token/refresh/".to_string(),
            refresh_before_expiry_secs: 60,
            refresh_failure_policy: RefreshFailurePolicy::default(),
            adopt_rotated_refresh_token: false,
            request_timeout: None,
        }
    }
}

impl AuthClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build from `TRAVELCOMPANION_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TRAVELCOMPANION_API_URL") {
            config.base_url = url;
        }
        if let Ok(secs) = std::env::var("TRAVELCOMPANION_REFRESH_BUFFER_SECS") {
            config.refresh_before_expiry_secs = secs.parse().map_err(|e| {
                ClientError::Configuration(format!(
                    "TRAVELCOMPANION_REFRESH_BUFFER_SECS={secs:?}: {e}"
                ))
            })?;
        }
        if let Ok(secs) = std::env::var("TRAVELCOMPANION_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                ClientError::Configuration(format!(
                    "TRAVELCOMPANION_REQUEST_TIMEOUT_SECS={secs:?}: {e}"
                ))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_refresh_before_expiry_secs(mut self, secs: i64) -> Self {
        self.refresh_before_expiry_secs = secs;
        self
    }

    pub fn with_refresh_failure_policy(mut self, policy: RefreshFailurePolicy) -> Self {
        self.refresh_failure_policy = policy;
        self
    }

    pub fn with_adopt_rotated_refresh_token(mut self, adopt: bool) -> Self {
        self.adopt_rotated_refresh_token = adopt;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Absolute URL for a path relative to `base_url`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn token_url(&self) -> String {
        self.endpoint(&self.token_path)
    }

    pub fn refresh_url(&self) -> String {
        self.endpoint(&self.refresh_path)
    }

    pub(crate) fn build_http_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

/// Base authentication client trait
///
/// Supplies the bearer token the request interceptor attaches.
pub trait AuthClient: Send + Sync + 'static {
    /// Get the access token to attach to the next request
    ///
    /// - No session: `Ok(None)`, the request goes out unauthenticated
    /// - Valid token: returns immediately
    /// - Token inside the expiry buffer: refreshes first
    /// - Refresh failed: the session is cleared and the refresh error returned
    fn get_access_token(&self) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// No-op authentication client for testing or unauthenticated scenarios
pub struct AuthClientNoop {}

impl AuthClient for AuthClientNoop {
    async fn get_access_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

impl AuthClientNoop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {})
    }
}

/// Authentication client backed by the TravelCompanion token endpoints
pub struct AuthClientHttp {
    config: AuthClientConfig,
    token_store: Arc<TokenStore>,
    http_client: Client,
    /// Coalesces concurrent refreshes of the session into one exchange
    token_refresh_singleflight: Group<String, RefreshError>,
}

impl AuthClientHttp {
    /// Create a new authentication client around an already hydrated store
    pub fn new(config: AuthClientConfig, token_store: Arc<TokenStore>) -> Result<Arc<Self>> {
        let http_client = config.build_http_client()?;

        Ok(Arc::new(Self {
            config,
            token_store,
            http_client,
            token_refresh_singleflight: Group::new(),
        }))
    }

    pub fn config(&self) -> &AuthClientConfig {
        &self.config
    }

    /// Get the token store (for advanced usage)
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.token_store
    }

    /// Exchange credentials for a token pair and store it
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response = self
            .http_client
            .post(self.config.token_url())
            .json(&request)
            .send()
            .await?;

        check_response!(response);

        let tokens: LoginResponse = response.json().await?;
        self.token_store.set_tokens(tokens.access, tokens.refresh);
        info!(username = %username, "Logged in");

        Ok(())
    }

    /// Drop the session locally
    pub fn logout(&self) {
        self.token_store.clear_tokens();
        info!("Logged out");
    }

    /// Refresh the access token now, sharing an exchange already in flight
    pub async fn refresh(&self) -> Result<String> {
        self.do_refresh_singleflight().await
    }

    async fn do_refresh_singleflight(&self) -> Result<String> {
        let (success_opt, error_opt, _shared) = self
            .token_refresh_singleflight
            .work(REFRESH_FLIGHT_KEY, async {
                match self.do_refresh().await {
                    Ok(access) => Ok(access),
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed, clearing session");
                        self.token_store.clear_tokens();
                        Err(e)
                    }
                }
            })
            .await;

        match (success_opt, error_opt) {
            (Some(token), None) => Ok(token),
            (None, Some(e)) => Err(e.into()),
            _ => Err(ClientError::Authentication(
                "Unknown error during token refresh".to_string(),
            )),
        }
    }

    /// One refresh exchange against the refresh endpoint
    ///
    /// Re-checks the session first: a caller that saw an expiring token may
    /// arrive after an earlier flight already renewed it.
    async fn do_refresh(&self) -> std::result::Result<String, RefreshError> {
        let tokens = self.token_store.current().ok_or(RefreshError::NoSession)?;

        if !access_expires_within(
            &tokens.access_token,
            unix_now_secs(),
            self.config.refresh_before_expiry_secs,
        ) {
            debug!("Access token already renewed");
            return Ok(tokens.access_token);
        }

        let request = RefreshRequest {
            refresh: tokens.refresh_token.clone(),
        };

        let response = self
            .http_client
            .post(self.config.refresh_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        if refreshed.access.is_empty() {
            return Err(RefreshError::InvalidResponse(
                "empty access token".to_string(),
            ));
        }

        let refresh_token = match refreshed.refresh {
            Some(rotated) if self.config.adopt_rotated_refresh_token && !rotated.is_empty() => {
                debug!("Adopting rotated refresh token");
                rotated
            }
            _ => tokens.refresh_token,
        };

        self.token_store
            .set_tokens(refreshed.access.clone(), refresh_token);
        info!("Access token refreshed successfully");

        Ok(refreshed.access)
    }
}

impl AuthClient for AuthClientHttp {
    async fn get_access_token(&self) -> Result<Option<String>> {
        match self
            .token_store
            .token_state(self.config.refresh_before_expiry_secs)
        {
            TokenState::Missing => Ok(None),
            TokenState::Valid(access) => Ok(Some(access)),
            TokenState::Expiring(_) => {
                debug!("Access token is about to expire, refreshing");
                self.do_refresh_singleflight().await.map(Some)
            }
        }
    }
}
