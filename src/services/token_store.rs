//! Token revocation store.
//!
//! DESIGN
//! ======
//! Revoked tokens are tracked by their `jti` until they would have expired
//! anyway. Redis is used when configured (`blacklist:{jti}` keys with TTL);
//! otherwise an in-process map stands in.
//!
//! ERROR HANDLING
//! ==============
//! Redis failures are logged. `is_revoked` fails open (reports not revoked)
//! and `revoke` reports `Failed`, so logout surfaces the failure while token
//! verification keeps working during a cache outage.
//!
//! Revocation is set-if-absent (`SET NX` on Redis), so of two concurrent
//! revocations of one `jti` exactly one sees `Revoked`. Refresh rotation
//! relies on this to spend a refresh token once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};

const KEY_PREFIX: &str = "blacklist:";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of a revocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// This call stored the mark.
    Revoked,
    /// The `jti` was already revoked.
    AlreadyRevoked,
    /// Nothing was stored.
    Failed,
}

impl Revocation {
    /// Whether the token is revoked after the attempt.
    #[must_use]
    pub fn is_revoked(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Mark `jti` revoked for `ttl` unless it already is.
    async fn revoke(&self, jti: &str, ttl: Duration) -> Revocation;

    /// Whether `jti` is currently revoked.
    async fn is_revoked(&self, jti: &str) -> bool;

    /// Short backend name for health output and logs.
    fn backend(&self) -> &'static str;
}

// =============================================================================
// REDIS
// =============================================================================

pub struct RedisTokenStore {
    conn: ConnectionManager,
}

impl RedisTokenStore {
    /// Connect to Redis and verify the connection with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the server is unreachable, or
    /// the connection does not come up within a few seconds.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);
        let connect = client.get_connection_manager_with_config(config);
        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| redis::RedisError::from((redis::ErrorKind::IoError, "redis connect timed out")))??;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Revocation {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(format!("{KEY_PREFIX}{jti}"))
            .arg("blacklisted")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await;
        match result {
            Ok(Some(_)) => {
                tracing::info!(%jti, "token revoked");
                Revocation::Revoked
            }
            Ok(None) => Revocation::AlreadyRevoked,
            Err(e) => {
                tracing::error!(error = %e, "failed to revoke token");
                Revocation::Failed
            }
        }
    }

    async fn is_revoked(&self, jti: &str) -> bool {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<bool> = conn.exists(format!("{KEY_PREFIX}{jti}")).await;
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to check token revocation");
            false
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Process-local store used when Redis is not configured or unreachable.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    revoked: Arc<Mutex<HashMap<String, Instant>>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn revoke_at(&self, jti: &str, ttl: Duration, now: Instant) -> Revocation {
        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        revoked.retain(|_, expires| *expires > now);
        if revoked.contains_key(jti) {
            return Revocation::AlreadyRevoked;
        }
        revoked.insert(jti.to_owned(), now + ttl);
        Revocation::Revoked
    }

    pub(crate) fn is_revoked_at(&self, jti: &str, now: Instant) -> bool {
        let revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        revoked.get(jti).is_some_and(|expires| *expires > now)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Revocation {
        self.revoke_at(jti, ttl, Instant::now())
    }

    async fn is_revoked(&self, jti: &str) -> bool {
        self.is_revoked_at(jti, Instant::now())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Pick Redis when a URL is configured and reachable, else the in-memory store.
pub async fn connect(redis_url: Option<&str>) -> Arc<dyn TokenStore> {
    let Some(url) = redis_url else {
        tracing::warn!("REDIS_URL not set; token revocation is process-local");
        return Arc::new(MemoryTokenStore::new());
    };
    match RedisTokenStore::connect(url).await {
        Ok(store) => {
            tracing::info!("redis token store connected");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to redis; token revocation is process-local");
            Arc::new(MemoryTokenStore::new())
        }
    }
}

#[cfg(test)]
#[path = "token_store_test.rs"]
mod tests;
