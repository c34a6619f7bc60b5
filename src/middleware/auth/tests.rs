use super::*;
use crate::api::build_router;
use crate::api::test_support::{register, test_state};
use crate::server::config::RuntimeEnv;
use axum::body::Body;
use axum::http::Request as HttpRequest;
use serde_json::Value;
use tower::ServiceExt;

async fn send(
    router: axum::Router,
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = HttpRequest::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ============================================================================
// Route matching
// ============================================================================

#[test]
fn test_route_matches_literal() {
    assert!(route_matches("v0/auth/sign-in", "v0/auth/sign-in"));
    assert!(!route_matches("v0/auth/sign-in", "v0/auth/sign-out"));
}

#[test]
fn test_route_matches_wildcard() {
    assert!(route_matches(
        "v0/users/get-user-password-salt/*",
        "v0/users/get-user-password-salt/alice"
    ));
    assert!(!route_matches(
        "v0/users/get-user-password-salt/*",
        "v0/users/get-user/alice"
    ));
}

#[test]
fn test_route_matches_segment_count() {
    assert!(!route_matches("v0/auth/sign-in", "v0/auth/sign-in/extra"));
    assert!(!route_matches("v0/gateway/*", "v0/gateway"));
}

#[test]
fn test_protected_routes_are_not_exempt() {
    assert!(!is_exempt("/v0/channels/123", false));
    assert!(EXEMPT_ROUTES
        .iter()
        .all(|pattern| !route_matches(pattern, "v0/channels/123")));
    assert!(!is_exempt("/v0/users/@self/channels", false));
}

#[test]
fn test_exempt_paths() {
    assert!(is_exempt("/v0/users/register", false));
    assert!(is_exempt("/v0/auth/sign-in", false));
    assert!(is_exempt("/v0/gateway/some.token.here", false));
    assert!(is_exempt("/v0/gateway", false));
}

#[test]
fn test_production_strips_api_prefix() {
    assert!(is_exempt("/api/v0/auth/sign-in", true));
    assert!(is_exempt("/api/v0/users/get-user-password-salt/bob", true));
    assert!(!is_exempt("/api/v0/auth/sign-in", false));
    assert!(!is_exempt("/api/v0/channels/123", true));
}

// ============================================================================
// Middleware
// ============================================================================

#[tokio::test]
async fn test_missing_header() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(router, Method::GET, "/v0/users/@self/channels", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "`Authorization` header required");
}

#[tokio::test]
async fn test_non_bearer_header() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(
        router,
        Method::GET,
        "/v0/users/@self/channels",
        Some("Basic YWxpY2U6c2VjcmV0"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "`Authorization` header must be a Bearer token");
}

#[tokio::test]
async fn test_empty_bearer_token() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(
        router,
        Method::GET,
        "/v0/users/@self/channels",
        Some("Bearer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No token provided");
}

#[tokio::test]
async fn test_invalid_token() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(
        router,
        Method::GET,
        "/v0/users/@self/channels",
        Some("Bearer not.a.token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn test_valid_token_reaches_handler() {
    let state = test_state(RuntimeEnv::Development).await;
    let (_, session) = register(&state, "alice").await;
    let router = build_router(state);

    let (status, body) = send(
        router,
        Method::GET,
        "/v0/users/@self/channels",
        Some(&format!("Bearer {}", session.0.token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn test_revoked_token_is_rejected() {
    let state = test_state(RuntimeEnv::Development).await;
    let (_, session) = register(&state, "alice").await;
    state.codec.revoke(&session.0.token).await.unwrap();
    let router = build_router(state);

    let (status, body) = send(
        router,
        Method::GET,
        "/v0/users/@self/channels",
        Some(&format!("Bearer {}", session.0.token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token does not exist");
}

#[tokio::test]
async fn test_preflight_passes() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(router, Method::OPTIONS, "/v0/users/@self/channels", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Preflight check successful.");
}

#[tokio::test]
async fn test_exempt_route_without_header() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(
        router,
        Method::POST,
        "/v0/users/register",
        None,
        Some(r#"{"username":"alice","nickname":"Alice","password":"derived:salt"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_unparseable_body() {
    let router = build_router(test_state(RuntimeEnv::Development).await);
    let (status, body) = send(
        router,
        Method::POST,
        "/v0/auth/sign-in",
        None,
        Some(r#"{"username":"alice"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid input");
}

#[tokio::test]
async fn test_production_mounts_under_api() {
    let state = test_state(RuntimeEnv::Production).await;
    let router = build_router(state);

    let (status, body) = send(router.clone(), Method::GET, "/api", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["env"], "prod");

    let (status, body) = send(
        router.clone(),
        Method::POST,
        "/api/v0/auth/sign-in",
        None,
        Some(r#"{"username":"nobody","password":"derived:salt"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User not found");

    let (status, _) = send(router, Method::GET, "/v0/users/@self/channels", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_require_session_without_middleware() {
    let (mut parts, _) = HttpRequest::builder()
        .uri("/")
        .body(())
        .unwrap()
        .into_parts();

    let rejection = RequireSession::from_request_parts(&mut parts, &())
        .await
        .err()
        .unwrap();
    assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(rejection.message(), "No session found");
}
