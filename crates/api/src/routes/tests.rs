//! Router tests for requests that are answered before the database is used.
//!
//! The pool is lazy and points at a closed port, so any handler that does
//! reach the database fails. Account roles are seeded into the account cache
//! so authentication never needs it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use marketplace_core::{UserId, UserRole};

use super::app;
use crate::config::{ApiConfig, UploadConfig};
use crate::services::push::PushSender;
use crate::state::AppState;

const BOUNDARY: &str = "marketplace-test-boundary";

fn test_state(upload_dir: &Path) -> AppState {
    let config = ApiConfig {
        database_url: SecretString::from("postgres://marketplace@127.0.0.1:1/marketplace"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        jwt_secret: SecretString::from("Zq8#vN2!mK5@wR9$tY3%uI7^oP1&aS4*"),
        token_ttl_hours: 1,
        uploads: UploadConfig {
            dir: upload_dir.to_path_buf(),
            max_bytes: 1024,
        },
        cors_origins: Vec::new(),
        trust_proxy: false,
        push: None,
        sentry_dsn: None,
        sentry_environment: None,
    };
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy("postgres://marketplace@127.0.0.1:1/marketplace")
        .unwrap();

    AppState::with_push(config, pool, PushSender::disabled())
}

const USER_ID: UserId = UserId::new(7);

/// Token for `USER_ID`, whose stored role is `role`.
async fn token(state: &AppState, role: UserRole) -> String {
    state.accounts().remember(USER_ID, role).await;
    state.tokens().issue(USER_ID, role).unwrap()
}

fn peer() -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 40_000)))
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(peer());
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(test_state(dir.path()))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(test_state(dir.path()))
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = send(
        app(test_state(dir.path())),
        json_request("POST", "/api/orders", None, "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized, no token");
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _) = send(
        app(test_state(dir.path())),
        json_request("GET", "/api/orders/mine", Some("not.a.token"), ""),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_order_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::User).await;

    let (status, body) = send(
        app(state),
        json_request(
            "POST",
            "/api/orders",
            Some(&token),
            r#"{"order_items":[],"shipping_address":"1 Main St","payment_method":"card"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn test_admin_routes_reject_shoppers() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::User).await;

    let (status, body) = send(app(state), json_request("GET", "/api/users", Some(&token), "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Not authorized as an admin");
}

#[tokio::test]
async fn test_product_without_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::Admin).await;

    let form = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nMug\r\n\
         --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"price\"\r\n\r\n8.50\r\n\
         --{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(form))
        .unwrap();

    let (status, body) = send(app(state), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Product image is required");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_review_rating_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::User).await;

    let (status, _) = send(
        app(state),
        json_request(
            "POST",
            "/api/products/3/reviews",
            Some(&token),
            r#"{"rating":9,"comment":"Great"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blank_chat_message_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::User).await;

    let (status, _) = send(
        app(state),
        json_request(
            "POST",
            "/api/conversations/1/messages",
            Some(&token),
            r#"{"content":"   "}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_events_require_token() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _) = send(
        app(test_state(dir.path())),
        json_request("GET", "/api/conversations/1/events", None, ""),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = send(
        app(test_state(dir.path())),
        json_request(
            "POST",
            "/api/auth/register",
            None,
            r#"{"name":"Ada","email":"ada@example.com","password":"short"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("at least 8"));
}

#[tokio::test]
async fn test_push_public_key_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _) = send(
        app(test_state(dir.path())),
        json_request("GET", "/api/push/public-key", None, ""),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_uploaded_files_are_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mug.png"), b"\x89PNG\r\n\x1a\n").unwrap();

    let response = app(test_state(dir.path()))
        .oneshot(Request::builder().uri("/uploads/mug.png").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_deleted_account_token_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::Admin).await;
    state.accounts().forget(USER_ID).await;

    let (status, body) = send(app(state), json_request("GET", "/api/users", Some(&token), "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized, account no longer exists");
}

#[tokio::test]
async fn test_demoted_admin_token_loses_admin_access() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let token = token(&state, UserRole::Admin).await;
    state.accounts().remember(USER_ID, UserRole::User).await;

    let (status, body) = send(app(state), json_request("GET", "/api/users", Some(&token), "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Not authorized as an admin");
}

#[tokio::test]
async fn test_rotating_forwarded_for_is_still_rate_limited() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(test_state(dir.path()));
    let body = r#"{"name":"Ada","email":"ada@example.com","password":"short"}"#;

    let mut statuses = Vec::new();
    for n in 0..6 {
        let mut request = json_request("POST", "/api/auth/register", None, body);
        request
            .headers_mut()
            .insert("x-forwarded-for", format!("198.51.100.{n}").parse().unwrap());
        let (status, _) = send(router.clone(), request).await;
        statuses.push(status);
    }

    assert!(statuses.iter().take(5).all(|s| *s == StatusCode::BAD_REQUEST));
    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_cors_exposes_request_id() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(test_state(dir.path()));

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/orders")
        .header(header::ORIGIN, "https://shop.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-request-id")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(preflight).await.unwrap();
    let allowed = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(allowed.contains("x-request-id"));

    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://shop.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_EXPOSE_HEADERS).unwrap(),
        "x-request-id"
    );
}
