//! Push subscription and notification repository.

use sqlx::PgPool;

use marketplace_core::UserId;

use super::RepositoryError;
use crate::models::{NewPushSubscription, PushNotification, PushSubscription};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, endpoint, p256dh, auth, created_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, title, body, url, created_at";

/// Repository for Web Push data.
pub struct PushRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PushRepository<'a> {
    /// Create a new push repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a subscription or refresh the keys of an existing endpoint.
    ///
    /// An anonymous re-subscribe keeps the endpoint's existing owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_subscription(
        &self,
        new: &NewPushSubscription,
    ) -> Result<PushSubscription, RepositoryError> {
        let subscription = sqlx::query_as::<_, PushSubscription>(&format!(
            r"
            INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint) DO UPDATE
            SET p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                user_id = COALESCE(EXCLUDED.user_id, push_subscriptions.user_id)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "
        ))
        .bind(new.user_id)
        .bind(&new.endpoint)
        .bind(&new.p256dh)
        .bind(&new.auth)
        .fetch_one(self.pool)
        .await?;

        Ok(subscription)
    }

    /// Remove a subscription by endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All subscriptions of one user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PushSubscription>, RepositoryError> {
        let subscriptions = sqlx::query_as::<_, PushSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Every subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<PushSubscription>, RepositoryError> {
        let subscriptions = sqlx::query_as::<_, PushSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Store notification content. `user_id` of `None` addresses everyone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_notification(
        &self,
        user_id: Option<UserId>,
        title: &str,
        body: &str,
        url: Option<&str>,
    ) -> Result<PushNotification, RepositoryError> {
        let notification = sqlx::query_as::<_, PushNotification>(&format!(
            r"
            INSERT INTO push_notifications (user_id, title, body, url)
            VALUES ($1, $2, $3, $4)
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(title)
        .bind(body)
        .bind(url)
        .fetch_one(self.pool)
        .await?;

        Ok(notification)
    }

    /// Newest notification addressed to the owner of `endpoint`, or to everyone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_for_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<Option<PushNotification>, RepositoryError> {
        let notification = sqlx::query_as::<_, PushNotification>(
            r"
            SELECT n.id, n.user_id, n.title, n.body, n.url, n.created_at
            FROM push_notifications n
            JOIN push_subscriptions s ON s.endpoint = $1
            WHERE n.user_id IS NULL OR n.user_id = s.user_id
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT 1
            ",
        )
        .bind(endpoint)
        .fetch_optional(self.pool)
        .await?;

        Ok(notification)
    }
}
