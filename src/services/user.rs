//! User accounts: registration, login bookkeeping, and profile edits.
//!
//! ERROR HANDLING
//! ==============
//! Duplicate emails are detected up front and again via the unique
//! constraint, so concurrent registrations still map to `EmailTaken`.

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

/// Failed attempts at which login is refused until an operator resets it.
pub const MAX_FAILED_LOGINS: i32 = 5;

pub const MAX_DISPLAY_NAME_LEN: usize = 100;
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_BIO_LEN: usize = 500;
pub const MAX_AVATAR_URL_LEN: usize = 500;

const USER_COLUMNS: &str = "id, email, hashed_password, display_name, first_name, last_name, bio, avatar_url,
     is_active, is_verified, is_superuser, failed_login_attempts, last_failed_login, last_login,
     created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Email already registered")]
    EmailTaken,
    #[error("User not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub failed_login_attempts: i32,
    pub last_failed_login: Option<OffsetDateTime>,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserRow {
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.failed_login_attempts >= MAX_FAILED_LOGINS
    }

    /// "First Last" when both are set, else display name, else email local part.
    #[must_use]
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            _ => self
                .display_name
                .clone()
                .unwrap_or_else(|| email_local_part(&self.email).to_owned()),
        }
    }
}

#[must_use]
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Optional profile fields shared by registration and profile edits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial profile update. The outer `Option` is "field present in the
/// request"; the inner one is the new value, where `null` clears the column.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfileUpdate {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ProfileUpdate {
    fn fields(&self) -> [(&'static str, Option<&Option<String>>); 5] {
        [
            ("display_name", self.display_name.as_ref()),
            ("first_name", self.first_name.as_ref()),
            ("last_name", self.last_name.as_ref()),
            ("bio", self.bio.as_ref()),
            ("avatar_url", self.avatar_url.as_ref()),
        ]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_none())
    }
}

/// Length limits for the optional profile fields, as `(field, value, max)`.
#[must_use]
pub fn profile_field_limits<'a>(
    display_name: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    bio: Option<&'a str>,
    avatar_url: Option<&'a str>,
) -> [(&'static str, Option<&'a str>, usize); 5] {
    [
        ("display_name", display_name, MAX_DISPLAY_NAME_LEN),
        ("first_name", first_name, MAX_NAME_LEN),
        ("last_name", last_name, MAX_NAME_LEN),
        ("bio", bio, MAX_BIO_LEN),
        ("avatar_url", avatar_url, MAX_AVATAR_URL_LEN),
    ]
}

// =============================================================================
// QUERIES
// =============================================================================

/// Look up a user by normalized email.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, UserError> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Look up a user by ID.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>, UserError> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Insert a new active, unverified user.
///
/// # Errors
///
/// Returns `EmailTaken` on a duplicate email, or a database error.
pub async fn create_user(pool: &PgPool, new_user: &NewUser) -> Result<UserRow, UserError> {
    if find_by_email(pool, &new_user.email).await?.is_some() {
        return Err(UserError::EmailTaken);
    }

    let result = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, email, hashed_password, display_name, first_name, last_name, bio, avatar_url,
                            is_active, is_verified)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, FALSE)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&new_user.email)
    .bind(&new_user.hashed_password)
    .bind(&new_user.display_name)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(&new_user.bio)
    .bind(&new_user.avatar_url)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(UserError::EmailTaken),
        Err(e) => Err(e.into()),
    }
}

/// Bump the failed-login counter.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn record_failed_login(pool: &PgPool, id: Uuid) -> Result<(), UserError> {
    sqlx::query(
        "UPDATE users
         SET failed_login_attempts = failed_login_attempts + 1, last_failed_login = now()
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reset the failed-login counter and stamp `last_login`.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn record_successful_login(pool: &PgPool, id: Uuid) -> Result<(), UserError> {
    sqlx::query("UPDATE users SET failed_login_attempts = 0, last_login = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply a partial profile update and return the fresh row.
///
/// # Errors
///
/// Returns `NotFound` if the user is gone, or a database error.
pub async fn update_profile(pool: &PgPool, id: Uuid, update: &ProfileUpdate) -> Result<UserRow, UserError> {
    let mut builder = QueryBuilder::new("UPDATE users SET updated_at = now()");
    for (column, value) in update.fields() {
        if let Some(value) = value {
            builder.push(", ").push(column).push(" = ").push_bind(value.clone());
        }
    }
    builder.push(" WHERE id = ").push_bind(id);
    builder.push(" RETURNING ").push(USER_COLUMNS);

    builder
        .build_query_as::<UserRow>()
        .fetch_optional(pool)
        .await?
        .ok_or(UserError::NotFound)
}

#[cfg(test)]
#[path = "user_test.rs"]
mod tests;
