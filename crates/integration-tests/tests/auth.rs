//! Integration tests for accounts and tokens.
//!
//! These tests require a running server (see the crate docs).

#![allow(clippy::unwrap_used)]

use marketplace_integration_tests::{admin_token, base_url, client, register_user};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running marketplace API server"]
async fn test_health_endpoints() {
    let client = client();
    let resp = client.get(format!("{}/health", base_url())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/health/ready", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running marketplace API server"]
async fn test_register_login_and_me() {
    let client = client();
    let user = register_user(&client).await;

    let resp = client
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({"email": user.email, "password": "correct horse battery"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap();

    let resp = client
        .get(format!("{}/api/auth/me", base_url()))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["id"].as_i64(), Some(user.id));
    assert_eq!(me["role"], "user");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
#[ignore = "Requires running marketplace API server"]
async fn test_duplicate_registration_conflicts() {
    let client = client();
    let user = register_user(&client).await;

    let resp = client
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({"name": "Again", "email": user.email, "password": "another password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running marketplace API server"]
async fn test_wrong_password_is_unauthorized() {
    let client = client();
    let user = register_user(&client).await;

    let resp = client
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({"email": user.email, "password": "not the password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].is_string());
}

#[tokio::test]
#[ignore = "Requires running marketplace API server and admin token"]
async fn test_deleted_account_token_is_rejected() {
    let Some(admin) = admin_token() else { return };
    let client = client();
    let user = register_user(&client).await;

    let resp = client
        .delete(format!("{}/api/users/{}", base_url(), user.id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/api/auth/me", base_url()))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
