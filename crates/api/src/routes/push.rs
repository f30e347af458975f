//! Web Push routes.
//!
//! Pushes carry no payload. When one arrives, the service worker calls
//! `GET /api/push/notifications/latest?endpoint=...` to fetch what to show.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::Ack;
use crate::db::push::PushRepository;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::models::{NewPushSubscription, PushNotification};
use crate::services::push::{PushError, PushReport, is_valid_endpoint};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/public-key", get(public_key))
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .route("/notifications/latest", get(latest))
        .route("/broadcast", post(broadcast))
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// Browser `PushSubscription.toJSON()` shape.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct EndpointRequest {
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub body: String,
    pub url: Option<String>,
}

/// GET /api/push/public-key
async fn public_key(State(state): State<AppState>) -> Result<Json<PublicKeyResponse>> {
    let key = state.push().public_key().ok_or(PushError::Disabled)?;
    Ok(Json(PublicKeyResponse {
        public_key: key.to_string(),
    }))
}

/// POST /api/push/subscribe
///
/// Signed-in callers get the subscription linked to their account so that
/// order updates reach them.
#[instrument(skip(state, user, body))]
async fn subscribe(
    OptionalAuth(user): OptionalAuth,
    State(state): State<AppState>,
    Json(body): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Ack>)> {
    let new = validate_subscription(body, user.map(|u| u.id))?;
    let stored = PushRepository::new(state.pool()).upsert_subscription(&new).await?;

    tracing::debug!(subscription_id = %stored.id, linked = stored.user_id.is_some(), "Push subscription saved");
    Ok((StatusCode::CREATED, Ack::new("Subscribed")))
}

/// POST /api/push/unsubscribe
async fn unsubscribe(
    State(state): State<AppState>,
    Json(body): Json<EndpointRequest>,
) -> Result<Json<Ack>> {
    PushRepository::new(state.pool())
        .delete_by_endpoint(&body.endpoint)
        .await?;
    Ok(Ack::new("Unsubscribed"))
}

/// GET /api/push/notifications/latest
async fn latest(
    State(state): State<AppState>,
    Query(query): Query<EndpointRequest>,
) -> Result<Json<PushNotification>> {
    PushRepository::new(state.pool())
        .latest_for_endpoint(&query.endpoint)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No notification for this subscription".to_string()))
}

/// POST /api/push/broadcast
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn broadcast(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<PushReport>> {
    let title = body.title.trim();
    let text = body.body.trim();
    if title.is_empty() || text.is_empty() {
        return Err(AppError::BadRequest("Title and body are required".to_string()));
    }

    let report = state
        .push()
        .broadcast(state.pool(), title, text, body.url.as_deref())
        .await?;
    Ok(Json(report))
}

fn validate_subscription(
    body: SubscribeRequest,
    user_id: Option<marketplace_core::UserId>,
) -> Result<NewPushSubscription> {
    if !is_valid_endpoint(&body.endpoint) {
        return Err(PushError::InvalidEndpoint(body.endpoint).into());
    }
    if body.keys.p256dh.trim().is_empty() || body.keys.auth.trim().is_empty() {
        return Err(AppError::BadRequest("Subscription keys are required".to_string()));
    }

    Ok(NewPushSubscription {
        user_id,
        endpoint: body.endpoint,
        p256dh: body.keys.p256dh,
        auth: body.keys.auth,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::UserId;

    use super::*;

    fn request(endpoint: &str, auth: &str) -> SubscribeRequest {
        SubscribeRequest {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh: "BNc-key".to_string(),
                auth: auth.to_string(),
            },
        }
    }

    #[test]
    fn test_validate_subscription() {
        let new = validate_subscription(
            request("https://fcm.googleapis.com/fcm/send/abc", "secret"),
            Some(UserId::new(4)),
        )
        .unwrap();
        assert_eq!(new.user_id, Some(UserId::new(4)));

        let err = validate_subscription(request("http://insecure.test/x", "secret"), None).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(validate_subscription(request("https://push.test/x", " "), None).is_err());
    }
}
