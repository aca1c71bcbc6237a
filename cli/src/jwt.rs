//! Unverified JWT payload decoding.
//!
//! The CLI never holds the signing secret. Claims are read only to show who
//! is logged in and to recover an expiry for legacy session files; the server
//! remains the sole authority on whether a token is valid.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JwtError {
    #[error("token is not a three-part JWT")]
    Shape,
    #[error("payload is not base64url")]
    Base64,
    #[error("payload is not a JSON claim set")]
    Json,
}

/// Claims the CLI cares about. Unknown claims are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisplayClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Decode the payload segment without checking the signature.
pub fn decode_unverified(token: &str) -> Result<DisplayClaims, JwtError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtError::Shape);
    };
    // Padded payloads are tolerated.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| JwtError::Base64)?;
    serde_json::from_slice(&bytes).map_err(|_| JwtError::Json)
}

#[cfg(test)]
#[path = "jwt_test.rs"]
pub(crate) mod tests;
