//! Per-user scent profile (quiz ratings) and owned-fragrance collection.
//!
//! DESIGN
//! ======
//! Saving a quiz replaces the previous ratings wholesale and marks
//! onboarding complete. Owned fragrances are insert-only: IDs already in the
//! user's collection are left untouched and not counted.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::services::fragrance::{FRAGRANCE_COLUMNS, FragranceRow};

/// Ratings keyed by normalized note/accord name.
pub type Ratings = BTreeMap<String, i32>;

#[derive(Debug, thiserror::Error)]
pub enum ScentProfileError {
    #[error("Fragrances not found: {}", format_ids(.0))]
    UnknownFragrances(Vec<Uuid>),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

/// Where an owned fragrance entry came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragranceSource {
    #[default]
    Onboarding,
    AddedLater,
    Wishlist,
}

impl FragranceSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::AddedLater => "added_later",
            Self::Wishlist => "wishlist",
        }
    }

    /// Wishlist entries are tracked but not part of the owned collection.
    #[must_use]
    pub fn is_owned(self) -> bool {
        !matches!(self, Self::Wishlist)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScentProfileRow {
    pub user_id: Uuid,
    pub liked_notes: Json<Ratings>,
    pub liked_accords: Json<Ratings>,
    pub onboarding_complete: bool,
    pub onboarding_complete_at: Option<OffsetDateTime>,
}

/// A fragrance in a user's collection with the time it was added.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OwnedFragrance {
    #[sqlx(flatten)]
    pub fragrance: FragranceRow,
    pub added_at: OffsetDateTime,
}

// =============================================================================
// QUIZ
// =============================================================================

/// Replace the user's quiz ratings and mark onboarding complete.
///
/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn save_quiz(pool: &PgPool, user_id: Uuid, notes: &Ratings, accords: &Ratings) -> Result<(), ScentProfileError> {
    sqlx::query(
        "INSERT INTO user_scent_profiles (user_id, liked_notes, liked_accords, onboarding_complete, onboarding_complete_at)
         VALUES ($1, $2, $3, TRUE, now())
         ON CONFLICT (user_id) DO UPDATE SET
             liked_notes = EXCLUDED.liked_notes,
             liked_accords = EXCLUDED.liked_accords,
             onboarding_complete = TRUE,
             onboarding_complete_at = now(),
             updated_at = now()",
    )
    .bind(user_id)
    .bind(Json(notes))
    .bind(Json(accords))
    .execute(pool)
    .await?;

    tracing::info!(%user_id, notes = notes.len(), accords = accords.len(), "quiz profile saved");
    Ok(())
}

/// Load the user's scent profile, if they have one.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<ScentProfileRow>, ScentProfileError> {
    let row = sqlx::query_as::<_, ScentProfileRow>(
        "SELECT user_id, liked_notes, liked_accords, onboarding_complete, onboarding_complete_at
         FROM user_scent_profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// =============================================================================
// COLLECTION
// =============================================================================

/// Add fragrances to the user's collection. Returns how many were new.
///
/// # Errors
///
/// Returns `UnknownFragrances` listing every ID missing from the catalog, or a
/// database error.
pub async fn save_owned(
    pool: &PgPool,
    user_id: Uuid,
    fragrance_ids: &[Uuid],
    source: FragranceSource,
) -> Result<usize, ScentProfileError> {
    let existing: HashSet<Uuid> =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM fragrances WHERE id = ANY($1)")
            .bind(fragrance_ids)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();
    let unknown = unknown_ids(fragrance_ids, &existing);
    if !unknown.is_empty() {
        return Err(ScentProfileError::UnknownFragrances(unknown));
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0_usize;
    for id in fragrance_ids {
        let result = sqlx::query(
            "INSERT INTO user_fragrances (user_id, fragrance_id, source, owned)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, fragrance_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(id)
        .bind(source.as_str())
        .bind(source.is_owned())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() > 0 {
            inserted = inserted.saturating_add(1);
        }
    }
    tx.commit().await?;

    tracing::info!(%user_id, requested = fragrance_ids.len(), inserted, "owned fragrances saved");
    Ok(inserted)
}

/// Requested IDs not present in `existing`, in request order, without repeats.
pub(crate) fn unknown_ids(requested: &[Uuid], existing: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|id| !existing.contains(id) && seen.insert(**id))
        .copied()
        .collect()
}

/// The user's owned fragrances, most recently added first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn owned_fragrances(pool: &PgPool, user_id: Uuid) -> Result<Vec<OwnedFragrance>, ScentProfileError> {
    let rows = sqlx::query_as::<_, OwnedFragrance>(&format!(
        "SELECT {FRAGRANCE_COLUMNS}, uf.added_at
         FROM user_fragrances uf
         JOIN fragrances f ON f.id = uf.fragrance_id
         WHERE uf.user_id = $1 AND uf.owned
         ORDER BY uf.added_at DESC, f.name"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
#[path = "scent_profile_test.rs"]
mod tests;
