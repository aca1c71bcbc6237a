//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool, parsed settings, the token service, both rate
//! limiters, and the current recommendation engines.
//!
//! Engines are an optional snapshot behind a `RwLock`. A rebuild constructs
//! the new `Engines` outside the lock and swaps the `Arc` in; readers clone
//! the `Arc` and release the lock before scoring.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::rate_limit::RateLimiter;
use crate::recommend::{Catalog, Engines};
use crate::services::fragrance::{self, FragranceError};
use crate::services::token::TokenService;
use crate::services::token_store::TokenStore;

const GLOBAL_WINDOW: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum EngineBuildError {
    #[error("no fragrances found in database")]
    EmptyCatalog,
    #[error(transparent)]
    Catalog(#[from] FragranceError),
}

/// Shared application state, injected into Axum handlers via State extractor.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    pub tokens: Arc<TokenService>,
    /// Global per-client request budget.
    pub request_limiter: RateLimiter,
    /// Login attempts per client IP.
    pub login_limiter: RateLimiter,
    engines: Arc<RwLock<Option<Arc<Engines>>>>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, settings: Settings, store: Arc<dyn TokenStore>) -> Self {
        let tokens = Arc::new(TokenService::new(&settings.tokens, store));
        let request_limiter = RateLimiter::new(settings.rate_limits.requests_per_minute, GLOBAL_WINDOW);
        let login_limiter = RateLimiter::new(settings.rate_limits.login_limit, settings.rate_limits.login_window);
        Self {
            pool,
            settings: Arc::new(settings),
            tokens,
            request_limiter,
            login_limiter,
            engines: Arc::new(RwLock::new(None)),
        }
    }

    /// Current engines, if they have been built.
    pub async fn engines(&self) -> Option<Arc<Engines>> {
        self.engines.read().await.clone()
    }

    /// Replace the engine snapshot.
    pub async fn install_engines(&self, engines: Engines) {
        *self.engines.write().await = Some(Arc::new(engines));
    }

    /// Build engines over `catalog` and swap them in. An empty catalog is
    /// refused and leaves the current snapshot untouched.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCatalog` when there is nothing to recommend from.
    pub async fn install_catalog(&self, catalog: Catalog) -> Result<usize, EngineBuildError> {
        if catalog.is_empty() {
            return Err(EngineBuildError::EmptyCatalog);
        }
        let count = catalog.len();
        self.install_engines(Engines::new(catalog)).await;
        tracing::info!(fragrances = count, "recommendation engines rebuilt");
        Ok(count)
    }

    /// Load the catalog from Postgres and swap in freshly built engines.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog cannot be read or is empty; the
    /// previous engines stay installed in that case.
    pub async fn rebuild_engines(&self) -> Result<usize, EngineBuildError> {
        let rows = fragrance::load_catalog(&self.pool).await?;
        self.install_catalog(Catalog::from_rows(rows)).await
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
