//! Web Push subscription and notification types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketplace_core::{PushNotificationId, PushSubscriptionId, UserId};

/// A browser push subscription.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: PushSubscriptionId,
    pub user_id: Option<UserId>,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

/// A validated subscription to store.
#[derive(Debug, Clone)]
pub struct NewPushSubscription {
    pub user_id: Option<UserId>,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Notification content fetched by the service worker after a push arrives.
///
/// Pushes are sent without a payload, so the browser asks for the newest
/// notification addressed to its subscription.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PushNotification {
    pub id: PushNotificationId,
    /// `None` for broadcasts.
    pub user_id: Option<UserId>,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}
