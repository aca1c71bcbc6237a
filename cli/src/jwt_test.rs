use super::*;

pub(crate) fn fake_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

#[test]
fn decodes_access_claims() {
    let token = fake_token(&serde_json::json!({
        "sub": "6f1c2a9e-0000-4000-8000-000000000001",
        "email": "ana@example.com",
        "exp": 1_900_000_000,
        "iat": 1_899_998_200,
        "type": "access",
        "jti": "abc",
    }));
    let claims = decode_unverified(&token).unwrap();
    assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
    assert_eq!(claims.exp, 1_900_000_000);
    assert_eq!(claims.kind.as_deref(), Some("access"));
}

#[test]
fn refresh_claims_have_no_email() {
    let token = fake_token(&serde_json::json!({ "sub": "u", "exp": 10, "type": "refresh" }));
    assert_eq!(decode_unverified(&token).unwrap().email, None);
}

#[test]
fn padded_payload_is_accepted() {
    let token = fake_token(&serde_json::json!({ "sub": "u", "exp": 1 }));
    let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
    parts[1].push_str("==");
    assert!(decode_unverified(&parts.join(".")).is_ok());
}

#[test]
fn malformed_tokens_are_rejected() {
    assert_eq!(decode_unverified("only.two"), Err(JwtError::Shape));
    assert_eq!(decode_unverified("a.b.c.d"), Err(JwtError::Shape));
    assert_eq!(decode_unverified("a.!!!.c"), Err(JwtError::Base64));
    let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
    assert_eq!(decode_unverified(&not_json), Err(JwtError::Json));
}

#[test]
fn missing_exp_is_rejected() {
    let token = fake_token(&serde_json::json!({ "sub": "u" }));
    assert_eq!(decode_unverified(&token), Err(JwtError::Json));
}
