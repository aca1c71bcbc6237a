//! Profile analytics route.

use axum::extract::{Path, State};
use axum::response::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::extract::{AuthUser, user_error};
use crate::services::analytics::{self, ProfileResponse};
use crate::services::{scent_profile, user};
use crate::state::AppState;

/// `GET /api/v1/profile/{user_id}`: dashboard data for the caller, or for
/// anyone when the caller is a superuser.
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = Uuid::parse_str(raw_id.trim()).map_err(|_| ApiError::field("user_id", "Invalid user ID"))?;
    if user_id != auth.user.id && !auth.user.is_superuser {
        return Err(ApiError::Forbidden("Not authorized to view this profile".into()));
    }

    let target = if user_id == auth.user.id {
        auth.user
    } else {
        user::find_by_id(&state.pool, user_id)
            .await
            .map_err(user_error)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?
    };

    // Charts degrade to empty rather than failing the whole page.
    let profile = match scent_profile::find_profile(&state.pool, user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "scent profile unavailable");
            None
        }
    };
    let owned = match scent_profile::owned_fragrances(&state.pool, user_id).await {
        Ok(owned) => owned,
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "owned fragrances unavailable");
            Vec::new()
        }
    };

    Ok(Json(analytics::build_profile(&target, profile.as_ref(), &owned, OffsetDateTime::now_utc())))
}
