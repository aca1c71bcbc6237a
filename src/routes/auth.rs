//! Auth routes: registration, password login, token refresh and revocation,
//! and self-service profile edits.
//!
//! ERROR HANDLING
//! ==============
//! Login failures for unknown emails and wrong passwords share one message so
//! the endpoint does not reveal which accounts exist. Lockout (423) and
//! deactivation (403) are only reported after the account is identified.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::middleware::ClientIp;
use crate::rate_limit::RateDecision;
use crate::routes::extract::{ApiJson, AuthUser, BearerToken, user_error};
use crate::services::password::{self, CredentialError};
use crate::services::token::{TokenKind, TokenPair, TokenSubject};
use crate::services::token_store::Revocation;
use crate::services::user::{self, NewUser, ProfileUpdate, UserRow, profile_field_limits};
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct UserRead {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub full_name: String,
}

impl From<UserRow> for UserRead {
    fn from(row: UserRow) -> Self {
        let full_name = row.full_name();
        Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            first_name: row.first_name,
            last_name: row.last_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            is_active: row.is_active,
            is_verified: row.is_verified,
            created_at: row.created_at,
            last_login: row.last_login,
            full_name,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/v1/auth/register`: create an account.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterBody>,
) -> Result<(StatusCode, Json<UserRead>), ApiError> {
    let email = password::normalize_email(&body.email).map_err(credential_error)?;
    password::validate_password(&body.password).map_err(credential_error)?;
    check_field_lengths(profile_field_limits(
        body.display_name.as_deref(),
        body.first_name.as_deref(),
        body.last_name.as_deref(),
        body.bio.as_deref(),
        body.avatar_url.as_deref(),
    ))?;

    let plain = body.password;
    let hashed_password = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| ApiError::Internal(format!("hash task failed: {e}")))?
        .map_err(credential_error)?;

    let new_user = NewUser {
        email,
        hashed_password,
        display_name: body.display_name,
        first_name: body.first_name,
        last_name: body.last_name,
        bio: body.bio,
        avatar_url: body.avatar_url,
    };
    let row = user::create_user(&state.pool, &new_user).await.map_err(user_error)?;
    tracing::info!(user_id = %row.id, "user registered");
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// `POST /api/v1/auth/login`: exchange credentials for a token pair.
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Json<TokenPair>, ApiError> {
    if let RateDecision::Limited { retry_after_secs } = state.login_limiter.check_and_record(&format!("login:{ip}")) {
        tracing::warn!(client_ip = %ip, "login rate limit exceeded");
        return Err(ApiError::RateLimited {
            message: format!("Too many login attempts. Try again in {} minutes", retry_after_secs.div_ceil(60).max(1)),
            retry_after_secs,
        });
    }

    let email = body.email.trim().to_lowercase();
    let Some(row) = user::find_by_email(&state.pool, &email).await.map_err(user_error)? else {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    if row.is_locked() {
        tracing::warn!(user_id = %row.id, "login attempt on locked account");
        return Err(ApiError::Locked("Account locked due to too many failed login attempts".into()));
    }

    let plain = body.password;
    let stored = row.hashed_password.clone();
    let matches = tokio::task::spawn_blocking(move || password::verify_password(&plain, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("verify task failed: {e}")))?;
    if !matches {
        user::record_failed_login(&state.pool, row.id).await.map_err(user_error)?;
        tracing::info!(user_id = %row.id, attempts = row.failed_login_attempts + 1, "failed login");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    if !row.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".into()));
    }

    user::record_successful_login(&state.pool, row.id).await.map_err(user_error)?;
    let pair = state.tokens.issue_pair(subject(&row)).map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!(user_id = %row.id, "user logged in");
    Ok(Json(pair))
}

/// `GET /api/v1/auth/me`: the authenticated user.
pub async fn me(auth: AuthUser) -> Json<UserRead> {
    Json(auth.user.into())
}

/// `POST /api/v1/auth/refresh`: rotate a refresh token into a new pair.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshBody>,
) -> Result<Json<TokenPair>, ApiError> {
    let claims = state
        .tokens
        .verify(&body.refresh_token, TokenKind::Refresh)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired refresh token".into()))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired refresh token".into()))?;

    let row = user::find_by_id(&state.pool, user_id)
        .await
        .map_err(user_error)?
        .filter(|row| row.is_active)
        .ok_or_else(|| ApiError::Unauthorized("User not found or inactive".into()))?;

    match state.tokens.revoke(&body.refresh_token).await {
        Revocation::Revoked => {}
        Revocation::AlreadyRevoked => {
            tracing::warn!(%user_id, "refresh token reused during rotation");
            return Err(ApiError::Unauthorized("Invalid or expired refresh token".into()));
        }
        Revocation::Failed => tracing::warn!(%user_id, "refresh token could not be revoked during rotation"),
    }
    let pair = state.tokens.issue_pair(subject(&row)).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(pair))
}

/// `POST /api/v1/auth/logout`: revoke the presented access token.
pub async fn logout(State(state): State<AppState>, bearer: BearerToken) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.tokens.revoke(&bearer.token).await.is_revoked() {
        return Err(ApiError::Internal("Failed to logout".into()));
    }
    tracing::info!(user = %bearer.claims.sub, "user logged out");
    Ok(Json(serde_json::json!({ "message": "Successfully logged out" })))
}

/// `PATCH /api/v1/auth/profile`: partial update of the caller's profile.
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<UserRead>, ApiError> {
    check_field_lengths(profile_field_limits(
        patch_value(&update.display_name),
        patch_value(&update.first_name),
        patch_value(&update.last_name),
        patch_value(&update.bio),
        patch_value(&update.avatar_url),
    ))?;

    if update.is_empty() {
        return Ok(Json(auth.user.into()));
    }
    let row = user::update_profile(&state.pool, auth.user.id, &update).await.map_err(user_error)?;
    Ok(Json(row.into()))
}

// =============================================================================
// HELPERS
// =============================================================================

fn subject(row: &UserRow) -> TokenSubject<'_> {
    TokenSubject { id: row.id, email: &row.email, is_active: row.is_active, is_verified: row.is_verified }
}

fn patch_value(field: &Option<Option<String>>) -> Option<&str> {
    field.as_ref().and_then(Option::as_deref)
}

fn credential_error(err: CredentialError) -> ApiError {
    match err {
        CredentialError::Hash => ApiError::Internal(err.to_string()),
        other => ApiError::field(other.field(), other.to_string()),
    }
}

/// Reject any field longer than its limit, reporting every offender.
pub(crate) fn check_field_lengths(limits: [(&'static str, Option<&str>, usize); 5]) -> Result<(), ApiError> {
    let details: Vec<FieldError> = limits
        .iter()
        .filter_map(|(field, value, max)| {
            let len = (*value)?.chars().count();
            (len > *max).then(|| FieldError::new(*field, format!("{field} must be at most {max} characters")))
        })
        .collect();
    if details.is_empty() {
        return Ok(());
    }
    Err(ApiError::Validation { message: details[0].message.clone(), details })
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
