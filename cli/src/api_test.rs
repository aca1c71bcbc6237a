use super::*;

fn temp_store() -> SessionStore {
    SessionStore::new(std::env::temp_dir().join(format!("scentmatch-api-{}", uuid::Uuid::new_v4())).join("session.json"))
}

fn client(store: SessionStore) -> ApiClient {
    ApiClient::new("http://127.0.0.1:8000/", store).unwrap()
}

#[test]
fn urls_strip_trailing_slash() {
    let api = client(temp_store());
    assert_eq!(api.api_url("/auth/me"), "http://127.0.0.1:8000/api/v1/auth/me");
    assert_eq!(api.root_url("/health"), "http://127.0.0.1:8000/health");
}

#[test]
fn error_message_prefers_envelope() {
    let body = json!({ "error": { "code": "AUTHENTICATION_ERROR", "message": "Invalid email or password" } });
    assert_eq!(error_message(&body), "Invalid email or password");
    assert_eq!(error_message(&json!({ "detail": "Not Found" })), "Not Found");
    assert_eq!(error_message(&json!("Bad Gateway")), "Bad Gateway");
    assert_eq!(error_message(&Value::Null), "request failed");
}

#[test]
fn token_pair_deserializes_login_response() {
    let pair: TokenPair = serde_json::from_value(json!({
        "access_token": "a",
        "refresh_token": "r",
        "token_type": "bearer",
        "expires_in": 1800,
    }))
    .unwrap();
    assert_eq!(pair.expires_in, 1800);
    assert!(serde_json::from_value::<TokenPair>(json!({ "access_token": "a" })).is_err());
}

#[tokio::test]
async fn bearer_without_session_is_not_logged_in() {
    let api = client(temp_store());
    assert!(matches!(api.bearer().await, Err(CliError::NotLoggedIn)));
}

#[tokio::test]
async fn fresh_session_is_used_without_network() {
    let store = temp_store();
    store
        .save(&Session { access_token: "fresh".into(), refresh_token: None, expires_at: unix_now() + 600 })
        .unwrap();
    assert_eq!(client(store).bearer().await.unwrap(), "fresh");
}

#[tokio::test]
async fn expired_session_without_refresh_token_is_cleared() {
    let store = temp_store();
    store
        .save(&Session { access_token: "stale".into(), refresh_token: None, expires_at: unix_now() + 10 })
        .unwrap();
    let api = client(store);
    assert!(matches!(api.bearer().await, Err(CliError::SessionExpired)));
    assert!(!api.store().path().exists());
}

#[tokio::test]
async fn logout_without_session_reports_nothing_to_do() {
    assert!(!client(temp_store()).logout().await.unwrap());
}

#[tokio::test]
async fn logout_of_expired_session_skips_server() {
    let store = temp_store();
    store
        .save(&Session { access_token: "stale".into(), refresh_token: Some("r".into()), expires_at: 0 })
        .unwrap();
    let api = client(store);
    assert!(!api.logout().await.unwrap());
    assert!(!api.store().path().exists());
}
