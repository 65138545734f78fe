use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use blog_api::{
    AppState,
    access::Requester,
    auth::{AuthUser, Claims, DEBUG_USER_HEADER, verify_token},
    config::{AppConfig, Env},
    repository::MemoryRepository,
    storage::MockStorageService,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};

// --- Helper Functions ---

const TEST_CLERK_SECRET: &str = "test-secret-value-1234567890";
const TEST_SUBJECT: &str = "user_2abcDEF";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_token_with(subject: &str, exp: u64, azp: Option<&str>, secret: &str) -> String {
    let claims = Claims {
        sub: subject.to_string(),
        iat: Some(now() as usize),
        exp: exp as usize,
        azp: azp.map(str::to_string),
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_token(subject: &str) -> String {
    create_token_with(subject, now() + 3600, None, TEST_CLERK_SECRET)
}

fn create_app_state(env: Env, repo: Arc<MemoryRepository>) -> AppState {
    let mut config = AppConfig::default();
    config.env = env.clone();
    config.clerk_secret_key = TEST_CLERK_SECRET.to_string();

    if env == Env::Production {
        config.s3_endpoint = "http://mock-prod-s3".to_string();
        config.s3_key = "prod_key_stub".to_string();
        config.s3_secret = "prod_secret_stub".to_string();
    }

    AppState {
        repo,
        storage: Arc::new(MockStorageService::new()),
        config,
    }
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

fn parts_with_bearer(token: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    parts
}

// --- AuthUser (required authentication) ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = parts_with_bearer(&create_token(TEST_SUBJECT));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_ok());
    let user = auth_user.unwrap();
    assert_eq!(user.clerk_user_id, TEST_SUBJECT);
    assert!(!user.is_admin);
}

#[tokio::test]
async fn test_first_sight_creates_user_once() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));

    let mut first = parts_with_bearer(&create_token(TEST_SUBJECT));
    let mut second = parts_with_bearer(&create_token(TEST_SUBJECT));

    let a = AuthUser::from_request_parts(&mut first, &app_state).await.unwrap();
    let b = AuthUser::from_request_parts(&mut second, &app_state).await.unwrap();

    assert_eq!(a.id, b.id, "The same subject must map to the same local user");
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    // Well past the default leeway.
    let token = create_token_with(TEST_SUBJECT, now() - 3600, None, TEST_CLERK_SECRET);
    let mut parts = parts_with_bearer(&token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_signature() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let token = create_token_with(TEST_SUBJECT, now() + 3600, None, "some-other-secret");
    let mut parts = parts_with_bearer(&token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_non_bearer_scheme() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

// --- Requester (optional authentication) ---

#[tokio::test]
async fn test_requester_anonymous_without_credentials() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/api/articles".parse().unwrap());

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(requester.unwrap(), Requester::Anonymous);
}

#[tokio::test]
async fn test_requester_invalid_token_is_rejected_not_anonymous() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = parts_with_bearer("not-a-jwt");

    let requester = Requester::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(requester.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_requester_resolves_user_and_admin() {
    let repo = Arc::new(MemoryRepository::new());
    repo.set_admin("user_admin", true).await;
    let app_state = create_app_state(Env::Production, repo);

    let mut user_parts = parts_with_bearer(&create_token(TEST_SUBJECT));
    let user = Requester::from_request_parts(&mut user_parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user, Requester::User(TEST_SUBJECT.to_string()));

    let mut admin_parts = parts_with_bearer(&create_token("user_admin"));
    let admin = Requester::from_request_parts(&mut admin_parts, &app_state)
        .await
        .unwrap();
    assert_eq!(admin, Requester::Admin("user_admin".to_string()));
}

// --- Token verification ---

#[test]
fn test_authorized_party_check() {
    let mut config = AppConfig::default();
    config.clerk_secret_key = TEST_CLERK_SECRET.to_string();
    config.clerk_authorized_parties = vec!["http://localhost:5173".to_string()];

    let allowed = create_token_with(
        TEST_SUBJECT,
        now() + 3600,
        Some("http://localhost:5173"),
        TEST_CLERK_SECRET,
    );
    assert_eq!(verify_token(&allowed, &config).unwrap().sub, TEST_SUBJECT);

    let foreign = create_token_with(
        TEST_SUBJECT,
        now() + 3600,
        Some("https://evil.example.com"),
        TEST_CLERK_SECRET,
    );
    assert_eq!(
        verify_token(&foreign, &config).unwrap_err(),
        StatusCode::UNAUTHORIZED
    );

    let missing = create_token_with(TEST_SUBJECT, now() + 3600, None, TEST_CLERK_SECRET);
    assert_eq!(
        verify_token(&missing, &config).unwrap_err(),
        StatusCode::UNAUTHORIZED
    );
}

#[test]
fn test_authorized_party_ignored_when_unconfigured() {
    let mut config = AppConfig::default();
    config.clerk_secret_key = TEST_CLERK_SECRET.to_string();

    let token = create_token_with(
        TEST_SUBJECT,
        now() + 3600,
        Some("https://anything.example.com"),
        TEST_CLERK_SECRET,
    );
    assert!(verify_token(&token, &config).is_ok());
}

#[test]
fn test_malformed_pem_key_is_a_server_error() {
    let mut config = AppConfig::default();
    config.clerk_jwt_key = Some("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----".into());

    let token = create_token(TEST_SUBJECT);
    assert_eq!(
        verify_token(&token, &config).unwrap_err(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

// --- Local development bypass ---

#[tokio::test]
async fn test_local_bypass_header_success() {
    let app_state = create_app_state(Env::Local, Arc::new(MemoryRepository::new()));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static(DEBUG_USER_HEADER),
        header::HeaderValue::from_static("user_local"),
    );

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.clerk_user_id, "user_local");
}

#[tokio::test]
async fn test_local_debug_user_from_config() {
    let mut app_state = create_app_state(Env::Local, Arc::new(MemoryRepository::new()));
    app_state.config.debug_clerk_user_id = Some("user_debug".to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.clerk_user_id, "user_debug");
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let mut app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    // Even if set, the debug identity is only honoured locally.
    app_state.config.debug_clerk_user_id = Some("user_debug".to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static(DEBUG_USER_HEADER),
        header::HeaderValue::from_static("user_local"),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}
