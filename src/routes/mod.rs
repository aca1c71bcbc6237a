//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the health endpoints at the root and the versioned API
//! under `/api/v1`. Middleware wraps everything, outermost first: request
//! context (correlation ID + access log), HTTP trace span, the global rate
//! limit and security headers, CORS, then the request size guard.

pub mod auth;
pub mod extract;
pub mod health;
pub mod profile;
pub mod recommendations;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderValue, Method, Request};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, patch, post};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::middleware;
use crate::state::AppState;

/// Versioned API routes.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", patch(auth::update_profile))
        .route("/recommendations/note-based", post(recommendations::note_based))
        .route("/recommendations/similarity", post(recommendations::similarity))
        .route("/recommendations/search", get(recommendations::search))
        .route("/recommendations/autocomplete", get(recommendations::autocomplete))
        .route("/recommendations/popular", get(recommendations::popular))
        .route("/recommendations/save-quiz-profile", post(recommendations::save_quiz_profile))
        .route("/recommendations/save-owned-fragrances", post(recommendations::save_owned_fragrances))
        .route("/recommendations/debug/initialize", post(recommendations::debug_initialize))
        .route("/recommendations/health", get(recommendations::health))
        .route("/recommendations/catalog/import", post(recommendations::import_catalog))
        .route("/profile/{user_id}", get(profile::get_profile))
}

/// Full application router with middleware.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/health/db", get(health::health_db))
        .route("/health/detailed", get(health::health_detailed))
        .nest("/api/v1", api_routes())
        .layer(from_fn_with_state(state.clone(), middleware::request_size_guard))
        .layer(cors)
        .layer(from_fn_with_state(state.clone(), middleware::security))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(from_fn(middleware::request_context))
        .with_state(state)
}

/// Configured origins, credentials allowed. Unparseable origins are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH])
        .allow_headers(AllowHeaders::mirror_request())
}

fn make_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "http-request",
        method = %request.method(),
        path = request.uri().path(),
        correlation_id = %middleware::correlation_id(),
    )
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
