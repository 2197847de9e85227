//! TravelCompanion Rust Client
//!
//! A client library for the TravelCompanion API with JWT session persistence
//! and transparent access-token refresh before outgoing requests.

pub mod api_client;
pub mod auth_client;
pub mod error;
pub mod jwt;
pub mod storage;
pub mod token_store;
pub mod types;

pub use api_client::ApiClient;
pub use auth_client::{AuthClient, AuthClientConfig, AuthClientHttp, AuthClientNoop};
pub use error::{ClientError, RefreshError, Result};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use token_store::TokenStore;
pub use types::{AuthTokens, RefreshFailurePolicy, TokenState};
