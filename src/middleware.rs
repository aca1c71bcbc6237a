//! Request middleware: correlation IDs, access logging, size guard, global
//! rate limiting, and security headers.
//!
//! ARCHITECTURE
//! ============
//! Layers run outermost first:
//! 1. `request_context` assigns the correlation ID and logs the request.
//! 2. `security` applies the global rate limit and stamps response headers.
//! 3. `request_size_guard` rejects oversized declared bodies.
//!
//! `security` sits outside CORS and the size guard so preflight answers,
//! 413s, and its own 429s all carry the security and rate-limit headers.
//!
//! The correlation ID lives in a task-local for the duration of the request
//! so `ApiError` can embed it without threading it through every handler.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::rate_limit::RateDecision;
use crate::state::AppState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
const MAX_CORRELATION_LEN: usize = 64;
const USER_AGENT_BUCKETS: u32 = 10_000;

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Correlation ID of the request being served, or `unknown` outside one.
#[must_use]
pub fn correlation_id() -> String {
    CORRELATION_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| "unknown".to_owned())
}

/// First eight characters of a fresh UUIDv4.
#[must_use]
pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

fn incoming_correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= MAX_CORRELATION_LEN)
        .map(str::to_owned)
}

// =============================================================================
// CLIENT IDENTITY
// =============================================================================

/// Client address: the socket peer, then `unknown`. The first
/// `X-Forwarded-For` hop wins only when `trust_forwarded` is set.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_owned(),
    }
}

/// Rate-limit key: client IP plus a stable bucket of the user agent.
#[must_use]
pub fn client_key(ip: &str, user_agent: Option<&str>) -> String {
    let digest = Sha256::digest(user_agent.unwrap_or("unknown").as_bytes());
    let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % USER_AGENT_BUCKETS;
    format!("{ip}:{bucket}")
}

/// Extractor for the caller's address as seen by `client_ip`.
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_ip(&parts.headers, peer, state.settings.trust_forwarded_for)))
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Assign a correlation ID, run the request inside its scope, and log the outcome.
pub async fn request_context(req: Request, next: Next) -> Response {
    let id = incoming_correlation_id(req.headers()).unwrap_or_else(new_correlation_id);
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let mut response = CORRELATION_ID.scope(id.clone(), next.run(req)).await;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    tracing::info!(
        correlation_id = %id,
        %method,
        %path,
        status = response.status().as_u16(),
        duration_ms = format_args!("{duration_ms:.2}"),
        "request"
    );

    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    response
}

/// Reject requests whose declared `Content-Length` exceeds the configured cap.
pub async fn request_size_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let max = state.settings.max_request_bytes;
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(length) = declared {
        if length > max {
            tracing::warn!(content_length = length, max_allowed = max, "request size too large");
            return ApiError::PayloadTooLarge(format!("Request size exceeds maximum of {max} bytes")).into_response();
        }
    }
    next.run(req).await
}

/// Global per-client rate limit plus security and rate-limit response headers.
pub async fn security(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer, state.settings.trust_forwarded_for);
    let user_agent = req.headers().get(header::USER_AGENT).and_then(|v| v.to_str().ok());
    let key = client_key(&ip, user_agent);

    let limiter = &state.request_limiter;
    let reset_at = time::OffsetDateTime::now_utc().unix_timestamp()
        + i64::try_from(limiter.window().as_secs()).unwrap_or(i64::MAX);

    let remaining = match limiter.check_and_record(&key) {
        RateDecision::Allowed { remaining } => remaining,
        RateDecision::Limited { .. } => {
            tracing::warn!(client_ip = %ip, "rate limit exceeded");
            let window = limiter.window().as_secs();
            let mut response = ApiError::RateLimited {
                message: "Too many requests. Please try again later.".into(),
                retry_after_secs: window,
            }
            .into_response();
            let headers = response.headers_mut();
            apply_rate_headers(headers, limiter.limit(), 0, reset_at);
            apply_security_headers(headers, &state.settings.version);
            return response;
        }
    };

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    apply_rate_headers(headers, limiter.limit(), remaining, reset_at);
    apply_security_headers(headers, &state.settings.version);
    response
}

fn apply_rate_headers(headers: &mut HeaderMap, limit: usize, remaining: usize, reset_at: i64) {
    for (name, value) in [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
        ("x-ratelimit-reset", reset_at.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

pub(crate) fn apply_security_headers(headers: &mut HeaderMap, version: &str) {
    const STATIC_HEADERS: [(&str, &str); 6] = [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("x-xss-protection", "1; mode=block"),
        ("strict-transport-security", "max-age=31536000; includeSubDomains"),
        ("content-security-policy", "default-src 'self'"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
    ];
    for (name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if let Ok(value) = HeaderValue::from_str(version) {
        headers.insert(HeaderName::from_static("x-api-version"), value);
    }
}

#[cfg(test)]
#[path = "middleware_test.rs"]
mod tests;
