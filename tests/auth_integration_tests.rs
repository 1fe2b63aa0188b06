use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use course_portal::{
    AppState, InMemoryRepository, LocalIdentityProvider,
    auth::{AuthUser, Claims, MaybeAuthUser},
    config::{AppConfig, Env},
    models::{Role, User},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn now() -> usize {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> String {
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &key).unwrap()
}

fn create_token(user_id: Uuid, exp: usize) -> String {
    let claims = Claims {
        sub: user_id,
        iat: now(),
        exp,
    };
    sign(&claims, TEST_JWT_SECRET)
}

fn test_user(role: Role) -> User {
    User {
        id: TEST_USER_ID,
        name: "Test User".to_string(),
        email: "test@example.com".to_string(),
        role,
        ..User::default()
    }
}

fn create_app_state(env: Env, users: Vec<User>) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::new(
        Arc::new(InMemoryRepository::with_users(users)),
        Arc::new(LocalIdentityProvider::new()),
        config,
    )
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(token: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    parts
}

fn with_dev_header(user_id: Uuid) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        "x-user-id",
        header::HeaderValue::from_str(&user_id.to_string()).unwrap(),
    );
    parts
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Instructor)]);
    let mut parts = with_bearer(&create_token(TEST_USER_ID, now() + 3600));

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.role, Role::Instructor);
}

#[tokio::test]
async fn test_role_comes_from_store_not_token() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    let token = create_token(TEST_USER_ID, now() + 3600);

    app_state
        .repo
        .set_user_role(TEST_USER_ID, Role::Admin)
        .await
        .unwrap();

    let user = AuthUser::from_request_parts(&mut with_bearer(&token), &app_state)
        .await
        .unwrap();
    assert!(user.is_admin());
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    // Well past the validator's default leeway.
    let mut parts = with_bearer(&create_token(TEST_USER_ID, now() - 3600));

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_signature() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    let claims = Claims {
        sub: TEST_USER_ID,
        iat: now(),
        exp: now() + 3600,
    };
    let mut parts = with_bearer(&sign(&claims, "some-other-secret"));

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unauthenticated");
}

#[tokio::test]
async fn test_auth_failure_for_unknown_subject() {
    let app_state = create_app_state(Env::Production, vec![]);
    let mut parts = with_bearer(&create_token(TEST_USER_ID, now() + 3600));

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[derive(Serialize)]
struct AudienceClaims {
    sub: Uuid,
    exp: usize,
    iat: usize,
    aud: String,
}

#[tokio::test]
async fn test_audience_is_checked_when_configured() {
    let mut app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    app_state.config.jwt_audience = Some("authenticated".to_string());

    let good = AudienceClaims {
        sub: TEST_USER_ID,
        exp: now() + 3600,
        iat: now(),
        aud: "authenticated".to_string(),
    };
    let ok = AuthUser::from_request_parts(
        &mut with_bearer(&sign(&good, TEST_JWT_SECRET)),
        &app_state,
    )
    .await;
    assert!(ok.is_ok());

    let bad = AudienceClaims {
        aud: "anon".to_string(),
        ..good
    };
    let rejected = AuthUser::from_request_parts(
        &mut with_bearer(&sign(&bad, TEST_JWT_SECRET)),
        &app_state,
    )
    .await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn test_local_dev_header_bypass() {
    let app_state = create_app_state(Env::Local, vec![test_user(Role::Admin)]);

    let user = AuthUser::from_request_parts(&mut with_dev_header(TEST_USER_ID), &app_state)
        .await
        .unwrap();
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn test_dev_header_ignored_in_production() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Admin)]);

    let err = AuthUser::from_request_parts(&mut with_dev_header(TEST_USER_ID), &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_maybe_auth_user_without_credentials_is_anonymous() {
    let app_state = create_app_state(Env::Production, vec![]);
    let mut parts = get_request_parts(Method::GET, "/courses".parse().unwrap());

    let MaybeAuthUser(viewer) = MaybeAuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(viewer.is_none());
}

#[tokio::test]
async fn test_maybe_auth_user_rejects_bad_credentials() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    let mut parts = with_bearer("not-a-jwt");

    let result = MaybeAuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_maybe_auth_user_resolves_valid_token() {
    let app_state = create_app_state(Env::Production, vec![test_user(Role::Student)]);
    let mut parts = with_bearer(&create_token(TEST_USER_ID, now() + 3600));

    let MaybeAuthUser(viewer) = MaybeAuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(viewer.map(|v| v.id), Some(TEST_USER_ID));
}
