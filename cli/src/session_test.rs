use super::*;
use crate::jwt::tests::fake_token;

/// A store under a fresh directory in the system temp dir.
fn temp_store() -> SessionStore {
    let dir = std::env::temp_dir().join(format!("scentmatch-cli-{}", uuid::Uuid::new_v4()));
    SessionStore::new(dir.join("nested").join("session.json"))
}

fn pair() -> TokenPair {
    TokenPair {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_in: 1800,
    }
}

#[test]
fn expires_at_comes_from_expires_in() {
    let session = Session::from_pair(pair(), 1_000);
    assert_eq!(session.expires_at, 2_800);
    assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
}

#[test]
fn expiry_applies_skew() {
    let session = Session::from_pair(pair(), 1_000);
    assert!(!session.is_expired(2_769));
    assert!(session.is_expired(2_770));
    assert!(session.is_expired(5_000));
}

#[test]
fn missing_file_is_no_session() {
    assert_eq!(temp_store().load().unwrap(), None);
}

#[test]
fn save_then_load_creates_directories() {
    let store = temp_store();
    let session = Session::from_pair(pair(), 1_000);
    store.save(&session).unwrap();
    assert_eq!(store.load().unwrap(), Some(session));
    assert!(!store.temp_path().exists());
}

#[cfg(unix)]
#[test]
fn session_file_is_private() {
    use std::os::unix::fs::PermissionsExt;
    let store = temp_store();
    store.save(&Session::from_pair(pair(), 0)).unwrap();
    let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn clear_is_idempotent() {
    let store = temp_store();
    store.save(&Session::from_pair(pair(), 0)).unwrap();
    store.clear().unwrap();
    store.clear().unwrap();
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn legacy_token_is_migrated_with_jwt_expiry() {
    let store = temp_store();
    let token = fake_token(&serde_json::json!({ "sub": "u", "exp": 1_900_000_000 }));
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), serde_json::json!({ "token": token }).to_string()).unwrap();

    let session = store.load().unwrap().expect("migrated");
    assert_eq!(session.access_token, token);
    assert_eq!(session.expires_at, 1_900_000_000);
    assert_eq!(session.refresh_token, None);

    let rewritten: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(rewritten["expires_at"], 1_900_000_000);
    assert!(rewritten.get("token").is_none());
}

#[test]
fn legacy_token_without_readable_expiry_is_discarded() {
    let store = temp_store();
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), r#"{"token":"not-a-jwt"}"#).unwrap();
    assert_eq!(store.load().unwrap(), None);
    assert!(!store.path().exists());
}

#[test]
fn access_token_without_expiry_is_stamped_from_jwt() {
    let store = temp_store();
    let token = fake_token(&serde_json::json!({ "sub": "u", "exp": 1_800_000_000 }));
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    let stored = serde_json::json!({ "access_token": token, "refresh_token": "def" });
    std::fs::write(store.path(), stored.to_string()).unwrap();

    let session = store.load().unwrap().expect("migrated");
    assert_eq!(session.access_token, token);
    assert_eq!(session.refresh_token.as_deref(), Some("def"));
    assert_eq!(session.expires_at, 1_800_000_000);
    assert_eq!(store.load().unwrap(), Some(session));
}

#[test]
fn access_token_without_readable_expiry_is_discarded() {
    let store = temp_store();
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), r#"{"access_token":"abc","refresh_token":"def"}"#).unwrap();
    assert_eq!(store.load().unwrap(), None);
    assert!(!store.path().exists());
}

#[test]
fn default_path_prefers_xdg_config_home() {
    let path = default_path(|key| match key {
        "XDG_CONFIG_HOME" => Some(PathBuf::from("/xdg")),
        "HOME" => Some(PathBuf::from("/home/ana")),
        _ => None,
    })
    .unwrap();
    assert_eq!(path, PathBuf::from("/xdg/scentmatch/session.json"));
}

#[test]
fn default_path_falls_back_to_home() {
    let path = default_path(|key| match key {
        "XDG_CONFIG_HOME" => Some(PathBuf::from("relative")),
        "HOME" => Some(PathBuf::from("/home/ana")),
        _ => None,
    })
    .unwrap();
    assert_eq!(path, PathBuf::from("/home/ana/.config/scentmatch/session.json"));
    assert!(matches!(default_path(|_| None), Err(SessionError::NoConfigDir)));
}
