//! API client whose requests pass through the bearer-token interceptor

use crate::auth_client::{AuthClient, AuthClientConfig, AuthClientHttp};
use crate::error::{ClientError, Result};
use crate::types::RefreshFailurePolicy;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// TravelCompanion API client
///
/// Every request sent through [`ApiClient::send`] or [`ApiClient::execute`]
/// carries `Authorization: Bearer <access>` when a session exists, refreshing
/// the access token first when it is about to expire.
pub struct ApiClient<A: AuthClient = AuthClientHttp> {
    client: Client,
    config: AuthClientConfig,
    auth: Arc<A>,
}

impl<A: AuthClient> Clone for ApiClient<A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<A: AuthClient> ApiClient<A> {
    pub fn new(config: AuthClientConfig, auth: Arc<A>) -> Result<Self> {
        let client = config.build_http_client()?;
        Ok(Self {
            client,
            config,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn auth(&self) -> &Arc<A> {
        &self.auth
    }

    /// Create an undecorated request against a path relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.config.endpoint(path))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// Attach the current access token, refreshing it first if needed
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match self.auth.get_access_token().await {
            Ok(Some(access)) => {
                Ok(request.header(header::AUTHORIZATION, format!("Bearer {access}")))
            }
            Ok(None) => {
                debug!("No session, sending request unauthenticated");
                Ok(request)
            }
            Err(e) => match self.config.refresh_failure_policy {
                RefreshFailurePolicy::SendUnauthenticated => {
                    warn!(error = %e, "Sending request without a token after refresh failure");
                    Ok(request)
                }
                RefreshFailurePolicy::Abort => {
                    warn!(error = %e, "Aborting request after refresh failure");
                    Err(ClientError::AuthenticationRequired)
                }
            },
        }
    }

    /// Authorize and send, returning the response whatever its status
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).await?.send().await?;
        debug!(status = %response.status(), url = %response.url(), "Request completed");
        Ok(response)
    }

    /// Authorize, send and decode a successful JSON response
    pub async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}
