use http_body_util::BodyExt;

use super::*;

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn status_and_code_mapping() {
    let cases = [
        (ApiError::validation("bad"), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        (ApiError::Unprocessable { details: vec![] }, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR"),
        (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
        (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
        (ApiError::Locked("x".into()), StatusCode::LOCKED, "ACCOUNT_LOCKED"),
        (
            ApiError::RateLimited { message: "x".into(), retry_after_secs: 1 },
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
        ),
        (ApiError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE, "REQUEST_TOO_LARGE"),
        (ApiError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        (ApiError::Database(sqlx::Error::PoolTimedOut), StatusCode::SERVICE_UNAVAILABLE, "DATABASE_ERROR"),
        (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    ];
    for (err, status, code) in cases {
        assert_eq!(err.status(), status, "{err:?}");
        assert_eq!(err.code(), code, "{err:?}");
    }
}

#[test]
fn database_message_is_masked() {
    let err = ApiError::Database(sqlx::Error::Protocol("relation users does not exist".into()));
    assert_eq!(err.public_message(), "Database temporarily unavailable");
}

#[test]
fn internal_message_is_masked() {
    let err = ApiError::Internal("panic in scorer".into());
    assert_eq!(err.public_message(), "An unexpected error occurred");
}

#[tokio::test]
async fn envelope_has_expected_shape() {
    let response = ApiError::NotFound("User not found".into()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RESOURCE_NOT_FOUND");
    assert_eq!(json["error"]["message"], "User not found");
    assert_eq!(json["error"]["status_code"], 404);
    assert!(json["error"]["correlation_id"].is_string());
    assert!(json["error"].get("details").is_none());
}

#[tokio::test]
async fn field_error_includes_details() {
    let response = ApiError::field("password", "Password must contain at least one digit").into_response();
    let json = body_json(response).await;
    assert_eq!(json["error"]["details"][0]["field"], "password");
    assert_eq!(json["error"]["details"][0]["message"], "Password must contain at least one digit");
}

#[tokio::test]
async fn unprocessable_uses_generic_message() {
    let response = ApiError::Unprocessable { details: vec![FieldError::new("body", "expected value")] }.into_response();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Request validation failed");
    assert_eq!(json["error"]["details"][0]["field"], "body");
}

#[test]
fn rate_limited_sets_retry_after() {
    let response = ApiError::RateLimited { message: "slow down".into(), retry_after_secs: 42 }.into_response();
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
}
