//! Service configuration parsed from environment variables.
//!
//! Values are read through a lookup function so tests can feed a map instead
//! of mutating the process environment.

use std::time::Duration;

pub const DEFAULT_APP_NAME: &str = "ScentMatch";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_PORT: &str = "5432";
pub const DEFAULT_REDIS_PORT: &str = "6379";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 7;
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 100;
pub const DEFAULT_LOGIN_LIMIT: usize = 5;
pub const DEFAULT_LOGIN_WINDOW_SECS: u64 = 900;
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8000"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    pub secret_key: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub requests_per_minute: usize,
    pub login_limit: usize,
    pub login_window: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub app_name: String,
    pub version: String,
    pub debug: bool,
    pub production: bool,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub tokens: TokenSettings,
    pub cors_origins: Vec<String>,
    pub rate_limits: RateLimitSettings,
    pub max_request_bytes: u64,
    /// Honour `X-Forwarded-For` when identifying clients. Only safe behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Settings {
    /// Build settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    ///
    /// Required:
    /// - `SECRET_KEY`
    /// - `DATABASE_URL`, or `DATABASE_USERNAME` + `DATABASE_PASSWORD` + `DATABASE_NAME`
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let secret_key = get("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;
        let access_minutes = parse_or("ACCESS_TOKEN_EXPIRE_MINUTES", get("ACCESS_TOKEN_EXPIRE_MINUTES"), DEFAULT_ACCESS_TOKEN_MINUTES)?;
        let refresh_days = parse_or("REFRESH_TOKEN_EXPIRE_DAYS", get("REFRESH_TOKEN_EXPIRE_DAYS"), DEFAULT_REFRESH_TOKEN_DAYS)?;
        if access_minutes <= 0 {
            return Err(ConfigError::Invalid { var: "ACCESS_TOKEN_EXPIRE_MINUTES", reason: "must be positive".into() });
        }
        if refresh_days <= 0 {
            return Err(ConfigError::Invalid { var: "REFRESH_TOKEN_EXPIRE_DAYS", reason: "must be positive".into() });
        }

        let database_url = match get("DATABASE_URL") {
            Some(url) => normalize_database_url(&url),
            None => {
                let user = get("DATABASE_USERNAME").ok_or(ConfigError::Missing("DATABASE_URL or DATABASE_USERNAME"))?;
                let password = get("DATABASE_PASSWORD").ok_or(ConfigError::Missing("DATABASE_PASSWORD"))?;
                let name = get("DATABASE_NAME").ok_or(ConfigError::Missing("DATABASE_NAME"))?;
                let host = get("DATABASE_HOSTNAME").unwrap_or_else(|| "localhost".into());
                let port = get("DATABASE_PORT").unwrap_or_else(|| DEFAULT_DB_PORT.into());
                format!("postgres://{user}:{password}@{host}:{port}/{name}")
            }
        };

        let redis_url = get("REDIS_URL").or_else(|| {
            let host = get("REDIS_HOSTNAME")?;
            let port = get("REDIS_PORT").unwrap_or_else(|| DEFAULT_REDIS_PORT.into());
            Some(match get("REDIS_PASSWORD") {
                Some(password) => format!("redis://:{password}@{host}:{port}/0"),
                None => format!("redis://{host}:{port}/0"),
            })
        });

        let cors_origins = match get("BACKEND_CORS_ORIGINS") {
            Some(raw) => parse_origin_list(&raw),
            None => DEFAULT_CORS_ORIGINS.iter().map(|s| (*s).to_owned()).collect(),
        };

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "development".into());

        Ok(Self {
            app_name: get("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.into()),
            version: get("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").into()),
            debug: get("DEBUG").as_deref().and_then(parse_bool).unwrap_or(false),
            production: environment.eq_ignore_ascii_case("production"),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            database_url,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), DEFAULT_DB_MAX_CONNECTIONS)?,
            redis_url,
            tokens: TokenSettings {
                secret_key,
                access_ttl: Duration::from_secs(minutes_to_secs(access_minutes)),
                refresh_ttl: Duration::from_secs(minutes_to_secs(refresh_days.saturating_mul(24 * 60))),
            },
            cors_origins,
            rate_limits: RateLimitSettings {
                requests_per_minute: parse_or(
                    "RATE_LIMIT_REQUESTS_PER_MINUTE",
                    get("RATE_LIMIT_REQUESTS_PER_MINUTE"),
                    DEFAULT_REQUESTS_PER_MINUTE,
                )?,
                login_limit: parse_or("LOGIN_RATE_LIMIT", get("LOGIN_RATE_LIMIT"), DEFAULT_LOGIN_LIMIT)?,
                login_window: Duration::from_secs(parse_or(
                    "LOGIN_RATE_WINDOW_SECS",
                    get("LOGIN_RATE_WINDOW_SECS"),
                    DEFAULT_LOGIN_WINDOW_SECS,
                )?),
            },
            max_request_bytes: parse_or("MAX_REQUEST_BYTES", get("MAX_REQUEST_BYTES"), DEFAULT_MAX_REQUEST_BYTES)?,
            trust_forwarded_for: get("TRUST_FORWARDED_FOR").as_deref().and_then(parse_bool).unwrap_or(false),
        })
    }
}

/// Parse a loose boolean (`1/true/yes/on`, `0/false/no/off`).
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid { var, reason: e.to_string() }),
        None => Ok(default),
    }
}

fn minutes_to_secs(minutes: i64) -> u64 {
    u64::try_from(minutes).unwrap_or(0).saturating_mul(60)
}

/// Accept hosted-provider URLs that carry driver suffixes or the short scheme.
fn normalize_database_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgres://{rest}");
    }
    url.to_owned()
}

/// Origins may be given as a JSON array or a comma-separated list.
fn parse_origin_list(raw: &str) -> Vec<String> {
    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list;
        }
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
