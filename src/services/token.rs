//! JWT issuance, verification, and revocation.
//!
//! ARCHITECTURE
//! ============
//! Access and refresh tokens are HS256 JWTs signed with `SECRET_KEY`. Both
//! carry a random `jti` and a `type` claim; verification checks signature,
//! expiry, expected type, and the revocation store, in that order.
//!
//! TRADE-OFFS
//! ==========
//! Refresh tokens are stateless. Rotation revokes the presented refresh
//! token's `jti`, so replay protection is only as durable as the store.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenSettings;
use crate::services::token_store::{Revocation, TokenStore};

const JTI_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims. Identity fields are only present on access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

impl Claims {
    /// Parse `sub` as a user ID.
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// User attributes embedded into an access token.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub is_active: bool,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    #[must_use]
    pub fn new(settings: &TokenSettings, store: Arc<dyn TokenStore>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret_key.as_bytes()),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            store,
        }
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Issue an access token for `subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_access(&self, subject: TokenSubject<'_>) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = Claims {
            sub: subject.id.to_string(),
            email: Some(subject.email.to_owned()),
            is_active: Some(subject.is_active),
            is_verified: Some(subject.is_verified),
            exp: now + secs_i64(self.access_ttl),
            iat: now,
            jti: Some(generate_jti()),
            kind: TokenKind::Access,
        };
        self.sign(&claims)
    }

    /// Issue a refresh token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: None,
            is_active: None,
            is_verified: None,
            exp: now + secs_i64(self.refresh_ttl),
            iat: now,
            jti: Some(generate_jti()),
            kind: TokenKind::Refresh,
        };
        self.sign(&claims)
    }

    /// Issue a fresh access + refresh pair.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_pair(&self, subject: TokenSubject<'_>) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject)?,
            refresh_token: self.issue_refresh(subject.id)?,
            token_type: "bearer".to_owned(),
            expires_in: self.access_ttl.as_secs(),
        })
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    /// Decode a token, checking signature, expiry, type, and revocation.
    pub async fn verify(&self, token: &str, expected: TokenKind) -> Option<Claims> {
        let claims = self.decode(token, true)?;
        if claims.kind != expected {
            return None;
        }
        if let Some(jti) = &claims.jti {
            if self.store.is_revoked(jti).await {
                return None;
            }
        }
        Some(claims)
    }

    /// Revoke a token until its natural expiry.
    ///
    /// Returns `Failed` for tokens that are malformed, already expired, lack a
    /// `jti`, or could not be written to the store.
    pub async fn revoke(&self, token: &str) -> Revocation {
        let Some(claims) = self.decode(token, false) else {
            return Revocation::Failed;
        };
        let Some(jti) = claims.jti.as_deref() else {
            return Revocation::Failed;
        };
        let remaining = claims.exp - unix_now();
        let Ok(remaining) = u64::try_from(remaining) else {
            return Revocation::Failed;
        };
        if remaining == 0 {
            return Revocation::Failed;
        }
        self.store.revoke(jti, Duration::from_secs(remaining)).await
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        if !validate_exp {
            validation.required_spec_claims.clear();
        }
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// 32 random alphanumerics.
#[must_use]
pub fn generate_jti() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(JTI_LEN)
        .map(char::from)
        .collect()
}

/// Pull the token out of `Authorization: Bearer <token>` (scheme case-insensitive).
#[must_use]
pub fn extract_bearer(authorization: &str) -> Option<&str> {
    let mut parts = authorization.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn secs_i64(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX / 2)
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
