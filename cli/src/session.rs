//! Session file owned by the CLI.
//!
//! DESIGN
//! ======
//! One JSON file holds `{access_token, refresh_token, expires_at}`. Only
//! `SessionStore` reads or writes it, and every write goes to a sibling temp
//! file that is renamed over the target, so a crash never leaves half a
//! session behind.
//!
//! A `Session` cannot be built without `expires_at`. Files from older
//! clients that stored a bare `{token}`, or `{access_token}` without an
//! expiry, are migrated on load by reading the JWT `exp` claim; a token whose
//! expiry cannot be read is discarded.
//!
//! TRADE-OFFS
//! ==========
//! Expiry is judged locally with a 30 s skew so a token is refreshed before
//! the server would reject it. The server still has the final word: a 401 on
//! a "fresh" token surfaces as a normal error.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::api::TokenPair;
use crate::jwt;

/// Seconds before `expires_at` at which a session counts as expired.
pub const EXPIRY_SKEW_SECS: i64 = 30;

const APP_DIR: &str = "scentmatch";
const FILE_NAME: &str = "session.json";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot locate a config directory; set HOME or pass --session-file")]
    NoConfigDir,
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: i64,
}

impl Session {
    /// Session for a freshly issued pair; `expires_at` comes from `expires_in`.
    #[must_use]
    pub fn from_pair(pair: TokenPair, now: i64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: Some(pair.refresh_token),
            expires_at: now.saturating_add(i64::try_from(pair.expires_in).unwrap_or(i64::MAX)),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now.saturating_add(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

/// On-disk shapes, newest first.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSession {
    Current(Session),
    Unstamped {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
    },
    Legacy {
        token: String,
        #[serde(default)]
        refresh_token: Option<String>,
    },
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/scentmatch/session.json`, else `~/.config/...`.
    pub fn default_location() -> Result<Self, SessionError> {
        default_path(|key| std::env::var_os(key).map(PathBuf::from)).map(Self::new)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current session, migrating a legacy file in place. Unreadable or
    /// unmigratable files are removed and reported as no session.
    pub fn load(&self) -> Result<Option<Session>, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(StoredSession::Current(session)) => Ok(Some(session)),
            Ok(
                StoredSession::Unstamped { access_token: token, refresh_token }
                | StoredSession::Legacy { token, refresh_token },
            ) => self.migrate(token, refresh_token),
            Err(e) => {
                eprintln!("warning: discarding unreadable session file ({e})");
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Stamp `expires_at` from the token's `exp` claim and rewrite the file.
    fn migrate(&self, token: String, refresh_token: Option<String>) -> Result<Option<Session>, SessionError> {
        match jwt::decode_unverified(&token) {
            Ok(claims) => {
                let session = Session { access_token: token, refresh_token, expires_at: claims.exp };
                self.save(&session)?;
                Ok(Some(session))
            }
            Err(e) => {
                eprintln!("warning: discarding legacy session ({e})");
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Replace the session file atomically.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        restrict_permissions(&tmp)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the session file. Missing files are not an error.
    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

pub(crate) fn default_path(lookup: impl Fn(&str) -> Option<PathBuf>) -> Result<PathBuf, SessionError> {
    let config_dir = lookup("XDG_CONFIG_HOME")
        .filter(|p| p.is_absolute())
        .or_else(|| lookup("HOME").map(|home| home.join(".config")))
        .ok_or(SessionError::NoConfigDir)?;
    Ok(config_dir.join(APP_DIR).join(FILE_NAME))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
