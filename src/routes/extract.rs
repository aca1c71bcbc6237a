//! Request extractors that reject with the API error envelope.
//!
//! Axum's stock `Json`/`Query` rejections render plain text. These wrappers
//! turn them into a 422 `VALIDATION_ERROR`, and the auth extractors turn a
//! missing or bad Bearer token into a 401.

use axum::extract::{FromRef, FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, FieldError};
use crate::services::token::{Claims, TokenKind, extract_bearer};
use crate::services::user::{self, UserRow};
use crate::state::AppState;

// =============================================================================
// BODY AND QUERY
// =============================================================================

/// JSON body whose rejection is a 422 envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::Unprocessable { details: vec![FieldError::new("body", rejection.body_text())] }),
        }
    }
}

/// Query string whose rejection is a 422 envelope.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::Unprocessable { details: vec![FieldError::new("query", rejection.body_text())] }),
        }
    }
}

// =============================================================================
// AUTH
// =============================================================================

/// A verified, unrevoked access token. No database lookup.
pub struct BearerToken {
    pub claims: Claims,
    pub token: String,
}

impl<S> FromRequestParts<S> for BearerToken
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".into()))?;

        let app_state = AppState::from_ref(state);
        let claims = app_state
            .tokens
            .verify(token, TokenKind::Access)
            .await
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))?;

        Ok(Self { claims, token: token.to_owned() })
    }
}

/// Authenticated, active user loaded from the access token's subject.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: UserRow,
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken { claims, token } = BearerToken::from_request_parts(parts, state).await?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))?;

        let app_state = AppState::from_ref(state);
        let user = user::find_by_id(&app_state.pool, user_id)
            .await
            .map_err(user_error)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
        if !user.is_active {
            return Err(ApiError::Forbidden("User account is deactivated".into()));
        }
        Ok(Self { user, token })
    }
}

pub(crate) fn user_error(err: user::UserError) -> ApiError {
    match err {
        user::UserError::EmailTaken => ApiError::field("email", "Email already registered"),
        user::UserError::NotFound => ApiError::NotFound("User not found".into()),
        user::UserError::Database(e) => ApiError::Database(e),
    }
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
