use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::routing::{get, post};
use serde::Deserialize;

use super::*;
use crate::routes::tests::{body_json, get_request, json_request, send, with_bearer};
use crate::services::token::TokenSubject;
use crate::state::test_helpers::test_app_state;

#[derive(Deserialize)]
struct Echo {
    n: u32,
}

async fn echo_body(ApiJson(body): ApiJson<Echo>) -> String {
    body.n.to_string()
}

async fn echo_query(ApiQuery(params): ApiQuery<Echo>) -> String {
    params.n.to_string()
}

async fn whoami(bearer: BearerToken) -> String {
    bearer.claims.sub
}

fn router() -> Router {
    Router::new()
        .route("/body", post(echo_body))
        .route("/query", get(echo_query))
        .route("/whoami", get(whoami))
        .with_state(test_app_state())
}

#[tokio::test]
async fn json_rejection_is_422_envelope() {
    let response = send(router(), json_request(Method::POST, "/body", &serde_json::json!({ "n": "seven" }))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"]["details"][0]["field"], "body");
}

#[tokio::test]
async fn missing_content_type_is_rejected() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/body")
        .body(Body::from(r#"{"n":1}"#))
        .unwrap();
    let response = send(router(), request).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn valid_body_and_query_pass_through() {
    let response = send(router(), json_request(Method::POST, "/body", &serde_json::json!({ "n": 7 }))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(router(), get_request("/query?n=3")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(router(), get_request("/query?n=-1")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"]["details"][0]["field"], "query");
}

#[tokio::test]
async fn bearer_token_accepts_valid_access_token() {
    let state = test_app_state();
    let user_id = uuid::Uuid::new_v4();
    let token = state
        .tokens
        .issue_access(TokenSubject { id: user_id, email: "ana@example.com", is_active: true, is_verified: false })
        .unwrap();
    let app = Router::new().route("/whoami", get(whoami)).with_state(state);

    let response = send(app, with_bearer(get_request("/whoami"), &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = http_body_util::BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
    assert_eq!(body, user_id.to_string().as_bytes());
}

#[tokio::test]
async fn bearer_token_rejections() {
    let response = send(router(), get_request("/whoami")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["message"], "Not authenticated");

    let request = Request::builder()
        .uri("/whoami")
        .header(header::AUTHORIZATION, "Bearer ")
        .body(Body::empty())
        .unwrap();
    let response = send(router(), request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(router(), with_bearer(get_request("/whoami"), "a.b.c")).await;
    assert_eq!(body_json(response).await["error"]["message"], "Invalid or expired token");
}

#[test]
fn user_errors_map_to_api_errors() {
    match user_error(user::UserError::EmailTaken) {
        ApiError::Validation { details, message } => {
            assert_eq!(details[0].field, "email");
            assert_eq!(message, "Email already registered");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(user_error(user::UserError::NotFound), ApiError::NotFound(_)));
}
