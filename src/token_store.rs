//! Session token store mirrored to durable storage

use crate::jwt;
use crate::storage::DurableStorage;
use crate::types::{unix_now_secs, AuthTokens, TokenState};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Holds the current session and mirrors it to durable storage
///
/// The session is swapped as a whole, so readers see either the previous
/// token pair or the new one, never a mix of both.
pub struct TokenStore {
    session: ArcSwapOption<AuthTokens>,
    storage: Arc<dyn DurableStorage>,
}

impl TokenStore {
    /// Create an unauthenticated store backed by `storage`
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            session: ArcSwapOption::empty(),
            storage,
        }
    }

    /// Create a store and load any session persisted in `storage`
    pub fn hydrate(storage: Arc<dyn DurableStorage>) -> Self {
        let store = Self::new(storage);
        store.load_tokens();
        store
    }

    /// Replace the session and mirror both tokens to storage
    pub fn set_tokens(&self, access: impl Into<String>, refresh: impl Into<String>) {
        let tokens = AuthTokens::new(access, refresh);

        if let Err(e) = self.storage.set_many(&[
            (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
        ]) {
            warn!(error = %e, "Failed to persist session tokens");
        }

        self.session.store(Some(Arc::new(tokens)));
        debug!("Session tokens updated");
    }

    /// Load the session from storage; both tokens must be present
    pub fn load_tokens(&self) {
        let read = |key: &str| match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read session token");
                None
            }
        };

        match (read(ACCESS_TOKEN_KEY), read(REFRESH_TOKEN_KEY)) {
            (Some(access), Some(refresh)) => {
                self.session
                    .store(Some(Arc::new(AuthTokens::new(access, refresh))));
                debug!("Session restored from storage");
            }
            _ => debug!("No persisted session"),
        }
    }

    /// Drop the session and delete both storage entries
    pub fn clear_tokens(&self) {
        self.session.store(None);

        if let Err(e) = self
            .storage
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
        {
            warn!(error = %e, "Failed to remove session tokens");
        }
        debug!("Session tokens cleared");
    }

    /// Current token pair, if authenticated
    pub fn current(&self) -> Option<AuthTokens> {
        self.session.load_full().map(|tokens| (*tokens).clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.load().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current().map(|t| t.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current().map(|t| t.refresh_token)
    }

    /// Whether the access token is missing, undecodable, or expires within `buffer_secs`
    pub fn token_will_expire_soon(&self, buffer_secs: i64) -> bool {
        self.token_will_expire_soon_at(unix_now_secs(), buffer_secs)
    }

    /// [`Self::token_will_expire_soon`] against an explicit clock reading
    pub fn token_will_expire_soon_at(&self, now_secs: f64, buffer_secs: i64) -> bool {
        match self.session.load_full() {
            Some(tokens) => access_expires_within(&tokens.access_token, now_secs, buffer_secs),
            None => true,
        }
    }

    /// Classify one snapshot of the session for the request interceptor
    pub fn token_state(&self, buffer_secs: i64) -> TokenState {
        match self.session.load_full() {
            None => TokenState::Missing,
            Some(tokens) if tokens.access_token.is_empty() => TokenState::Missing,
            Some(tokens) => {
                if access_expires_within(&tokens.access_token, unix_now_secs(), buffer_secs) {
                    TokenState::Expiring((*tokens).clone())
                } else {
                    TokenState::Valid(tokens.access_token.clone())
                }
            }
        }
    }
}

pub(crate) fn access_expires_within(access_token: &str, now_secs: f64, buffer_secs: i64) -> bool {
    if access_token.is_empty() {
        return true;
    }

    match jwt::decode_claims(access_token) {
        Ok(claims) => claims.exp - now_secs < buffer_secs as f64,
        Err(e) => {
            debug!(error = %e, "Access token could not be decoded, treating as expiring");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::test_support::{token_expiring_at, token_with_payload};
    use crate::storage::MemoryStorage;

    const NOW: f64 = 1_700_000_000.0;

    fn memory_store() -> (Arc<MemoryStorage>, TokenStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone());
        (storage, store)
    }

    #[test]
    fn test_set_tokens_mirrors_storage() {
        let (storage, store) = memory_store();
        store.set_tokens("access_123", "refresh_456");

        assert!(store.is_authenticated());
        assert_eq!(store.access_token().as_deref(), Some("access_123"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh_456"));
        assert_eq!(
            storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
            Some("access_123")
        );
        assert_eq!(
            storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("refresh_456")
        );
    }

    #[test]
    fn test_persistence_round_trip() {
        let (storage, store) = memory_store();
        store.set_tokens("a", "r");

        let fresh = TokenStore::new(storage);
        assert!(!fresh.is_authenticated());
        fresh.load_tokens();
        assert_eq!(fresh.current(), Some(AuthTokens::new("a", "r")));

        // idempotent
        fresh.load_tokens();
        assert_eq!(fresh.current(), Some(AuthTokens::new("a", "r")));
    }

    #[test]
    fn test_clear_does_not_resurrect() {
        let (storage, store) = memory_store();
        store.set_tokens("a", "r");
        store.clear_tokens();
        store.clear_tokens();
        assert!(!store.is_authenticated());

        let fresh = TokenStore::hydrate(storage);
        assert_eq!(fresh.current(), None);
    }

    #[test]
    fn test_load_requires_both_tokens() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "a").unwrap();
        assert!(!TokenStore::hydrate(storage.clone()).is_authenticated());

        storage.set(REFRESH_TOKEN_KEY, "").unwrap();
        assert!(!TokenStore::hydrate(storage.clone()).is_authenticated());

        storage.set(REFRESH_TOKEN_KEY, "r").unwrap();
        assert!(TokenStore::hydrate(storage).is_authenticated());
    }

    #[test]
    fn test_load_on_empty_storage_keeps_session() {
        let (_storage, store) = memory_store();
        store.load_tokens();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_expire_soon_without_token() {
        let (_storage, store) = memory_store();
        assert!(store.token_will_expire_soon(60));
        assert!(store.token_will_expire_soon_at(NOW, 0));
    }

    #[test]
    fn test_expire_soon_empty_or_malformed() {
        let (_storage, store) = memory_store();
        store.set_tokens("", "r");
        assert!(store.token_will_expire_soon_at(NOW, -1000));

        store.set_tokens("garbage", "r");
        assert!(store.token_will_expire_soon_at(NOW, -1000));
    }

    #[test]
    fn test_expire_soon_matches_buffer_arithmetic() {
        let (_storage, store) = memory_store();
        let exp = NOW as i64 + 30;
        store.set_tokens(token_expiring_at(exp), "r");

        assert!(store.token_will_expire_soon_at(NOW, 60));
        assert!(store.token_will_expire_soon_at(NOW, 31));
        assert!(!store.token_will_expire_soon_at(NOW, 30));
        assert!(!store.token_will_expire_soon_at(NOW, 0));
        // non-positive buffer only reports literal expiry
        assert!(!store.token_will_expire_soon_at(NOW + 29.5, 0));
        assert!(store.token_will_expire_soon_at(NOW + 31.0, 0));
        assert!(!store.token_will_expire_soon_at(NOW + 31.0, -5));
    }

    #[test]
    fn test_expire_soon_ignores_unusual_claim_types() {
        let (_storage, store) = memory_store();
        let exp = NOW as i64 + 3600;

        for extra in [
            serde_json::json!({ "exp": exp, "jti": 12345 }),
            serde_json::json!({ "exp": exp, "iat": "2023-11-14" }),
            serde_json::json!({ "exp": exp, "token_type": 1 }),
        ] {
            store.set_tokens(token_with_payload(&extra), "r");
            assert!(!store.token_will_expire_soon_at(NOW, 60), "{extra}");
            assert!(store.token_will_expire_soon_at(NOW, 3601), "{extra}");
        }
    }

    #[test]
    fn test_set_and_clear_use_batched_storage_writes() {
        #[derive(Default)]
        struct Recording {
            inner: MemoryStorage,
            calls: std::sync::Mutex<Vec<&'static str>>,
        }

        impl DurableStorage for Recording {
            fn get(&self, key: &str) -> crate::Result<Option<String>> {
                self.inner.get(key)
            }
            fn set(&self, key: &str, value: &str) -> crate::Result<()> {
                self.calls.lock().unwrap().push("set");
                self.inner.set(key, value)
            }
            fn remove(&self, key: &str) -> crate::Result<()> {
                self.calls.lock().unwrap().push("remove");
                self.inner.remove(key)
            }
            fn set_many(&self, entries: &[(&str, &str)]) -> crate::Result<()> {
                self.calls.lock().unwrap().push("set_many");
                self.inner.set_many(entries)
            }
            fn remove_many(&self, keys: &[&str]) -> crate::Result<()> {
                self.calls.lock().unwrap().push("remove_many");
                self.inner.remove_many(keys)
            }
        }

        let storage = Arc::new(Recording::default());
        let store = TokenStore::new(storage.clone());
        store.set_tokens("a", "r");
        store.clear_tokens();

        assert_eq!(*storage.calls.lock().unwrap(), vec!["set_many", "remove_many"]);
    }

    #[test]
    fn test_expire_soon_wall_clock() {
        let (_storage, store) = memory_store();
        let now = unix_now_secs() as i64;

        store.set_tokens(token_expiring_at(now + 30), "r");
        assert!(store.token_will_expire_soon(60));

        store.set_tokens(token_expiring_at(now + 3600), "r");
        assert!(!store.token_will_expire_soon(60));
    }

    #[test]
    fn test_token_state() {
        let (_storage, store) = memory_store();
        assert_eq!(store.token_state(60), TokenState::Missing);

        let now = unix_now_secs() as i64;
        let fresh = token_expiring_at(now + 900);
        store.set_tokens(fresh.clone(), "r");
        assert_eq!(store.token_state(60), TokenState::Valid(fresh));

        let stale = token_expiring_at(now + 10);
        store.set_tokens(stale.clone(), "r");
        assert_eq!(
            store.token_state(60),
            TokenState::Expiring(AuthTokens::new(stale, "r"))
        );
    }
}
