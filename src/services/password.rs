//! Password hashing and credential policy.
//!
//! Hashes are Argon2id PHC strings. A stored hash that fails to parse is
//! treated as a mismatch so a corrupt row can never authenticate.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 254;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Invalid email length")]
    EmailLength,
    #[error("Invalid email format")]
    EmailFormat,
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
    #[error("Password must be at most 128 characters")]
    PasswordTooLong,
    #[error("Password must contain at least one uppercase letter")]
    PasswordMissingUpper,
    #[error("Password must contain at least one lowercase letter")]
    PasswordMissingLower,
    #[error("Password must contain at least one digit")]
    PasswordMissingDigit,
    #[error("failed to hash password")]
    Hash,
}

impl CredentialError {
    /// Request field the failure belongs to.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmailLength | Self::EmailFormat => "email",
            _ => "password",
        }
    }
}

/// Trim, lowercase, and validate an email address.
///
/// # Errors
///
/// Returns an error when the address is empty, too long, or malformed.
pub fn normalize_email(raw: &str) -> Result<String, CredentialError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(CredentialError::EmailLength);
    }
    if !Regex::new(EMAIL_PATTERN).is_ok_and(|re| re.is_match(&email)) {
        return Err(CredentialError::EmailFormat);
    }
    Ok(email)
}

/// Enforce the registration password policy.
///
/// # Errors
///
/// Returns the first rule the password violates.
pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooShort);
    }
    if len > MAX_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooLong);
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(CredentialError::PasswordMissingUpper);
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(CredentialError::PasswordMissingLower);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(CredentialError::PasswordMissingDigit);
    }
    Ok(())
}

/// Hash a password with a fresh random salt.
///
/// # Errors
///
/// Returns an error if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CredentialError::Hash)
}

/// Check a password against a stored PHC string.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
#[path = "password_test.rs"]
mod tests;
