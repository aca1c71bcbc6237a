//! Liveness and dependency checks. Database failures show up as
//! `"unhealthy"` in the body; these endpoints never answer 5xx.

use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::db;
use crate::state::AppState;

/// Current UTC time as RFC 3339.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {} API", state.settings.app_name),
        "version": state.settings.version,
        "status": "running",
        "docs_url": Value::Null,
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "app_name": state.settings.app_name,
        "version": state.settings.version,
        "timestamp": now_rfc3339(),
    }))
}

/// `GET /health/db`
pub async fn health_db(State(state): State<AppState>) -> Json<Value> {
    match db::ping(&state.pool).await {
        Ok(()) => Json(json!({ "status": "healthy", "database": "connected" })),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            Json(json!({
                "status": "unhealthy",
                "database": "disconnected",
                "error": "Database temporarily unavailable",
            }))
        }
    }
}

/// `GET /health/detailed`
pub async fn health_detailed(State(state): State<AppState>) -> Json<Value> {
    let database = match db::ping(&state.pool).await {
        Ok(()) => json!({ "status": "healthy" }),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            json!({ "status": "unhealthy", "error": "Database temporarily unavailable" })
        }
    };
    let recommenders = match state.engines().await {
        Some(engines) => json!({ "status": "healthy", "fragrances": engines.catalog().len() }),
        None => json!({ "status": "not_loaded" }),
    };
    let token_store = json!({ "status": "healthy", "backend": state.tokens.store().backend() });

    let overall = if database["status"] == "healthy" { "healthy" } else { "unhealthy" };
    Json(json!({
        "status": overall,
        "timestamp": now_rfc3339(),
        "version": state.settings.version,
        "checks": {
            "database": database,
            "recommenders": recommenders,
            "token_store": token_store,
        },
    }))
}
