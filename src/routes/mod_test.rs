use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;

use super::*;
use crate::state::test_helpers::{test_app_state, test_app_state_with, test_settings_with};

// =============================================================================
// helpers shared by route tests
// =============================================================================

pub(crate) async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub(crate) fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub(crate) fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
    request
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// health
// =============================================================================

#[tokio::test]
async fn root_welcomes_with_app_name() {
    let response = send(app(test_app_state()), get_request("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Welcome to ScentMatch API");
    assert_eq!(json["status"], "running");
}

#[tokio::test]
async fn health_reports_version() {
    let state = test_app_state_with(test_settings_with(&[("APP_VERSION", "9.9.9")]));
    let response = send(app(state), get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], "9.9.9");
}

#[tokio::test]
async fn db_health_never_returns_server_error() {
    let response = send(app(test_app_state()), get_request("/health/db")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let status = json["status"].as_str().unwrap();
    assert!(status == "healthy" || status == "unhealthy", "{status}");
}

#[tokio::test]
async fn detailed_health_lists_checks() {
    let response = send(app(test_app_state()), get_request("/health/detailed")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["checks"]["recommenders"]["status"], "not_loaded");
    assert_eq!(json["checks"]["token_store"]["backend"], "memory");
}

#[tokio::test]
async fn recommender_health_is_503_before_engines_load() {
    let response = send(app(test_app_state()), get_request("/api/v1/recommendations/health")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
}

// =============================================================================
// middleware stack
// =============================================================================

#[tokio::test]
async fn responses_carry_security_and_rate_headers() {
    let response = send(app(test_app_state()), get_request("/health")).await;
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-ratelimit-limit"], "100");
    assert_eq!(headers["x-ratelimit-remaining"], "99");
    assert!(headers.contains_key("x-ratelimit-reset"));
    assert!(headers.contains_key("x-api-version"));
    assert_eq!(headers[middleware::CORRELATION_HEADER].len(), 8);
}

#[tokio::test]
async fn incoming_correlation_id_is_echoed() {
    let request = Request::builder()
        .uri("/health")
        .header(middleware::CORRELATION_HEADER, "trace-abc")
        .body(Body::empty())
        .unwrap();
    let response = send(app(test_app_state()), request).await;
    assert_eq!(response.headers()[middleware::CORRELATION_HEADER], "trace-abc");
}

#[tokio::test]
async fn global_rate_limit_returns_429_with_retry_after() {
    let state = test_app_state_with(test_settings_with(&[("RATE_LIMIT_REQUESTS_PER_MINUTE", "2")]));
    let router = app(state);
    for _ in 0..2 {
        let response = send(router.clone(), get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(router, get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-api-version"));
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn oversized_body_is_rejected_before_handler() {
    let state = test_app_state_with(test_settings_with(&[("MAX_REQUEST_BYTES", "16")]));
    let body = serde_json::json!({ "email": "someone@example.com", "password": "Password123" });
    let mut request = json_request(Method::POST, "/api/v1/auth/register", &body);
    let length = body.to_string().len().to_string();
    request
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from_str(&length).unwrap());

    let response = send(app(state), request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-api-version"], env!("CARGO_PKG_VERSION"));
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "REQUEST_TOO_LARGE");
    assert_eq!(json["error"]["status_code"], 413);
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/auth/login")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = send(app(test_app_state()), request).await;
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn cors_ignores_unknown_origin() {
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = send(app(test_app_state()), request).await;
    assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

// =============================================================================
// profile
// =============================================================================

#[tokio::test]
async fn profile_requires_authentication() {
    let uri = format!("/api/v1/profile/{}", uuid::Uuid::new_v4());
    let response = send(app(test_app_state()), get_request(&uri)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unreachable_database_is_503_without_driver_text() {
    let state = test_app_state();
    let token = state
        .tokens
        .issue_access(crate::services::token::TokenSubject {
            id: uuid::Uuid::new_v4(),
            email: "ana@example.com",
            is_active: true,
            is_verified: false,
        })
        .unwrap();
    let uri = format!("/api/v1/profile/{}", uuid::Uuid::new_v4());
    let response = send(app(state), with_bearer(get_request(&uri), &token)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "DATABASE_ERROR");
    assert_eq!(json["error"]["message"], "Database temporarily unavailable");
}
