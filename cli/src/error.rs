//! CLI error type. Every variant renders as the one line printed before a
//! non-zero exit.

use crate::jwt::JwtError;
use crate::quiz::QuizError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("not logged in; run `scentmatch-cli login`")]
    NotLoggedIn,
    #[error("session expired; run `scentmatch-cli login` again")]
    SessionExpired,
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session file: {0}")]
    Session(#[from] SessionError),
    #[error("token: {0}")]
    Jwt(#[from] JwtError),
    #[error("{0}")]
    Quiz(#[from] QuizError),
    #[error("reading {path}: {source}")]
    Input { path: String, source: std::io::Error },
    #[error("unexpected response: missing `{0}`")]
    MissingField(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
