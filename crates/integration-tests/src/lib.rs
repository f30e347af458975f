//! Integration tests for the marketplace API.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database, migrate, and run the server
//! mp-cli migrate
//! cargo run -p marketplace-api
//!
//! # Run the ignored contract tests against it
//! cargo test -p marketplace-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETPLACE_BASE_URL` - Server under test (default: `http://localhost:5000`)
//! - `MARKETPLACE_ADMIN_TOKEN` - Admin bearer token for catalog setup; tests
//!   that need one are skipped when it is unset

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("MARKETPLACE_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:5000".to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Admin token from the environment, if provided.
#[must_use]
pub fn admin_token() -> Option<String> {
    std::env::var("MARKETPLACE_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
}

/// HTTP client for tests.
///
/// # Panics
///
/// Panics if the client can't be built.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .build()
        .expect("Failed to create HTTP client")
}

/// A freshly registered shopper.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub token: String,
}

/// Register a shopper with a unique email.
///
/// # Panics
///
/// Panics if registration doesn't return 201 with a token.
pub async fn register_user(client: &Client) -> TestUser {
    let email = format!("test-{}@example.com", Uuid::new_v4().simple());
    let resp = client
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({
            "name": "Integration Tester",
            "email": email,
            "password": "correct horse battery",
        }))
        .send()
        .await
        .expect("Failed to register");

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.expect("Invalid register response");

    TestUser {
        id: body["user"]["id"].as_i64().expect("user id"),
        email,
        token: body["token"].as_str().expect("token").to_string(),
    }
}

/// Smallest valid PNG (1x1, transparent).
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Create a product with `stock` units as admin and return its JSON.
///
/// # Panics
///
/// Panics if the product can't be created.
pub async fn create_product(client: &Client, admin_token: &str, stock: i32) -> Value {
    let image = reqwest::multipart::Part::bytes(TINY_PNG.to_vec())
        .file_name("tiny.png")
        .mime_str("image/png")
        .expect("mime");
    let form = reqwest::multipart::Form::new()
        .text("name", format!("Test product {}", Uuid::new_v4().simple()))
        .text("description", "Created by integration tests")
        .text("price", "12.50")
        .text("stock", stock.to_string())
        .part("image", image);

    let resp = client
        .post(format!("{}/api/products", base_url()))
        .bearer_auth(admin_token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to create product");

    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.expect("Invalid product response")
}
