//! Unverified JWT claim decoding
//!
//! The client only needs the expiry claim to decide when to refresh. Signature
//! trust stays with the server that issues and accepts the token, so nothing
//! here verifies signatures.

use crate::error::{ClientError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

/// Claims read from an access token payload
///
/// Only `exp` is typed; the other claims are kept as raw JSON so an issuer's
/// choice of representation never makes an otherwise valid token undecodable.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch
    pub exp: f64,
    #[serde(default)]
    pub iat: Option<serde_json::Value>,
    #[serde(default)]
    pub jti: Option<serde_json::Value>,
    #[serde(default)]
    pub token_type: Option<serde_json::Value>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
}

/// Decode the payload segment of `token` without verifying its signature
pub fn decode_claims(token: &str) -> Result<Claims> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| ClientError::TokenDecode("missing payload segment".to_string()))?;

    // Accept padded and standard-alphabet encodings as well
    let normalized = payload
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_");

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized)
        .map_err(|e| ClientError::TokenDecode(format!("invalid base64 payload: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| ClientError::TokenDecode(format!("invalid claims: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    /// Unsigned token carrying the given payload JSON
    pub fn token_with_payload(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    pub fn token_expiring_at(exp: i64) -> String {
        token_with_payload(&serde_json::json!({
            "token_type": "access",
            "exp": exp,
            "iat": exp - 900,
            "jti": "3f1c",
            "user_id": 7
        }))
    }
}
