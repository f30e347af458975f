//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (database)
//! GET  /uploads/{file}                      - Uploaded images
//!
//! # Auth
//! POST /api/auth/register                   - Create account (rate limited)
//! POST /api/auth/login                      - Sign in (rate limited)
//! GET  /api/auth/me                         - Current user
//! PUT  /api/auth/me                         - Update own profile
//!
//! # Users (admin)
//! GET    /api/users                         - List users
//! PUT    /api/users/{id}/role               - Change role
//! DELETE /api/users/{id}                    - Delete user
//!
//! # Catalog
//! GET  /api/categories[/{id}]               - Categories (cached)
//! POST|PUT|DELETE /api/categories[/{id}]    - Admin, multipart
//! GET  /api/suppliers[/{id}]                - Suppliers
//! GET  /api/suppliers/{id}/products         - Supplier's products
//! POST|PUT|DELETE /api/suppliers[/{id}]     - Admin, JSON
//! GET  /api/products                        - Filtered, paginated listing
//! GET  /api/products/top                    - Highest rated
//! GET  /api/products/{id}                   - Product detail
//! POST|PUT|DELETE /api/products[/{id}]      - Admin, multipart
//! GET  /api/products/{id}/reviews           - Reviews
//! POST /api/products/{id}/reviews           - Add review
//!
//! # Orders
//! POST /api/orders                          - Place order
//! GET  /api/orders/mine                     - Own orders
//! GET  /api/orders/{id}                     - Order detail (owner or admin)
//! PUT  /api/orders/{id}/pay                 - Mark paid (owner or admin)
//! GET  /api/orders                          - All orders (admin)
//! PUT  /api/orders/{id}/status              - Change status (admin)
//!
//! # Chat
//! POST /api/conversations                   - Get or create with a supplier
//! GET  /api/conversations                   - Visible conversations
//! GET  /api/conversations/{id}/messages     - History
//! POST /api/conversations/{id}/messages     - Send
//! GET  /api/conversations/{id}/events       - Live events (SSE)
//!
//! # Contact
//! POST   /api/contact                       - Submit form (rate limited)
//! GET    /api/contact                       - List (admin)
//! PUT    /api/contact/{id}/read             - Mark read (admin)
//! DELETE /api/contact/{id}                  - Delete (admin)
//!
//! # Push
//! GET  /api/push/public-key                 - VAPID key
//! POST /api/push/subscribe                  - Save subscription
//! POST /api/push/unsubscribe                - Remove subscription
//! GET  /api/push/notifications/latest       - Content for the service worker
//! POST /api/push/broadcast                  - Notify everyone (admin)
//! ```

pub mod auth;
pub mod categories;
pub mod chat;
pub mod contact;
pub mod orders;
pub mod products;
pub mod push;
pub mod suppliers;
pub mod users;

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::from_fn,
    routing::get,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::middleware::request_id_middleware;
use crate::services::uploads::PUBLIC_PREFIX;
use crate::state::AppState;

/// Room for multipart framing and text fields on top of the image limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: &'static str,
}

impl Ack {
    #[must_use]
    pub const fn new(message: &'static str) -> Json<Self> {
        Json(Self { message })
    }
}

/// All `/api` routes. `trust_proxy` controls how rate limiters identify clients.
pub fn api_routes(trust_proxy: bool) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes(trust_proxy))
        .nest("/users", users::routes())
        .nest("/categories", categories::routes())
        .nest("/suppliers", suppliers::routes())
        .nest("/products", products::routes())
        .nest("/orders", orders::routes())
        .nest("/conversations", chat::routes())
        .nest("/contact", contact::routes(trust_proxy))
        .nest("/push", push::routes())
}

/// Build the complete application with middleware.
pub fn app(state: AppState) -> Router {
    let body_limit = state.images().max_bytes() + FORM_OVERHEAD_BYTES;
    let uploads = ServeDir::new(state.images().dir());
    let cors = cors_layer(&state.config().cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api_routes(state.config().trust_proxy))
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(cors)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// CORS for the SPA. An empty origin list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Delete an image stored by this request when the request failed afterwards.
pub(crate) async fn discard_upload_on_error<T>(
    state: &AppState,
    image: Option<&str>,
    result: crate::error::Result<T>,
) -> crate::error::Result<T> {
    if result.is_err()
        && let Some(path) = image
    {
        state.images().remove(path).await;
    }
    result
}

/// Clamp a client-supplied `limit` for small "top N" listings.
pub(crate) fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
