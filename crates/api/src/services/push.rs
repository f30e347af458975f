//! Web Push delivery.
//!
//! Pushes carry no payload, so no message encryption is needed. The service
//! worker wakes up and fetches the newest stored [`PushNotification`] for its
//! endpoint. Each request is authorized with a VAPID token: an ES256 JWT
//! whose audience is the push service origin.
//!
//! [`PushNotification`]: crate::models::PushNotification

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use marketplace_core::UserId;

use crate::config::PushConfig;
use crate::db::{PushRepository, RepositoryError};
use crate::models::PushSubscription;

/// Seconds a push service should hold an undelivered push.
const PUSH_TTL_SECONDS: u32 = 24 * 60 * 60;

/// Lifetime of a VAPID token; push services reject anything over 24 hours.
const VAPID_TOKEN_HOURS: i64 = 12;

/// Concurrent requests during a fan-out.
const MAX_IN_FLIGHT: usize = 8;

/// Errors from push delivery.
#[derive(Debug, Error)]
pub enum PushError {
    /// VAPID keys are not configured.
    #[error("push notifications are not configured")]
    Disabled,

    /// The configured private key can't be used for ES256.
    #[error("invalid VAPID private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    /// The subscription endpoint isn't an absolute https URL.
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    /// VAPID token could not be signed.
    #[error("VAPID signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// HTTP request to the push service failed.
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Push service answered with an unexpected status.
    #[error("push service returned {0}")]
    Rejected(StatusCode),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of sending to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Push service accepted the message.
    Sent,
    /// Subscription no longer exists at the push service.
    Gone,
}

/// Tally of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub sent: usize,
    pub failed: usize,
    /// Stale subscriptions deleted.
    pub removed: usize,
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

struct VapidKeys {
    public_key: String,
    subject: String,
    signing_key: EncodingKey,
}

/// Sends Web Push messages. Cheap to clone.
#[derive(Clone)]
pub struct PushSender {
    inner: Arc<PushSenderInner>,
}

struct PushSenderInner {
    client: reqwest::Client,
    vapid: Option<VapidKeys>,
}

impl PushSender {
    /// Create a sender. `None` disables delivery.
    ///
    /// # Errors
    ///
    /// Returns `PushError::InvalidKey` if the private key isn't a PKCS#8 P-256 PEM.
    pub fn new(config: Option<&PushConfig>) -> Result<Self, PushError> {
        let vapid = config
            .map(|config| {
                let signing_key =
                    EncodingKey::from_ec_pem(config.private_key_pem.expose_secret().as_bytes())
                        .map_err(PushError::InvalidKey)?;
                Ok::<_, PushError>(VapidKeys {
                    public_key: config.public_key.clone(),
                    subject: config.subject.clone(),
                    signing_key,
                })
            })
            .transpose()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            inner: Arc::new(PushSenderInner { client, vapid }),
        })
    }

    /// A sender that never delivers.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(PushSenderInner {
                client: reqwest::Client::new(),
                vapid: None,
            }),
        }
    }

    /// Whether VAPID keys are configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.vapid.is_some()
    }

    /// Application server key for `PushManager.subscribe`.
    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        self.inner.vapid.as_ref().map(|v| v.public_key.as_str())
    }

    /// Send a payload-less push to one subscription.
    ///
    /// # Errors
    ///
    /// Returns `PushError` if the push is not accepted. A 404 or 410 from the
    /// push service is reported as `Ok(Delivery::Gone)`.
    pub async fn send(&self, subscription: &PushSubscription) -> Result<Delivery, PushError> {
        let vapid = self.inner.vapid.as_ref().ok_or(PushError::Disabled)?;
        let audience = push_audience(&subscription.endpoint)?;

        let claims = VapidClaims {
            aud: &audience,
            exp: (Utc::now() + chrono::Duration::hours(VAPID_TOKEN_HOURS)).timestamp(),
            sub: &vapid.subject,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &vapid.signing_key)
            .map_err(PushError::Signing)?;

        let response = self
            .inner
            .client
            .post(&subscription.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("vapid t={token}, k={}", vapid.public_key),
            )
            .header("TTL", PUSH_TTL_SECONDS.to_string())
            .header("Urgency", "normal")
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        classify(response.status())
    }

    /// Store a notification for one user and push to all of their devices.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Disabled` when push isn't configured, or
    /// `PushError::Repository` if the notification can't be stored.
    #[instrument(skip(self, pool, body))]
    pub async fn notify_user(
        &self,
        pool: &PgPool,
        user_id: UserId,
        title: &str,
        body: &str,
        url: Option<&str>,
    ) -> Result<PushReport, PushError> {
        if !self.is_enabled() {
            return Err(PushError::Disabled);
        }

        let repo = PushRepository::new(pool);
        let subscriptions = repo.list_for_user(user_id).await?;
        if subscriptions.is_empty() {
            return Ok(PushReport::default());
        }

        repo.create_notification(Some(user_id), title, body, url).await?;
        Ok(self.fan_out(&repo, subscriptions).await)
    }

    /// Store a notification for everyone and push to every subscription.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Disabled` when push isn't configured, or
    /// `PushError::Repository` if the notification can't be stored.
    #[instrument(skip(self, pool, body))]
    pub async fn broadcast(
        &self,
        pool: &PgPool,
        title: &str,
        body: &str,
        url: Option<&str>,
    ) -> Result<PushReport, PushError> {
        if !self.is_enabled() {
            return Err(PushError::Disabled);
        }

        let repo = PushRepository::new(pool);
        repo.create_notification(None, title, body, url).await?;
        let subscriptions = repo.list_all().await?;
        let report = self.fan_out(&repo, subscriptions).await;

        info!(
            sent = report.sent,
            failed = report.failed,
            removed = report.removed,
            "Push broadcast finished"
        );
        Ok(report)
    }

    async fn fan_out(
        &self,
        repo: &PushRepository<'_>,
        subscriptions: Vec<PushSubscription>,
    ) -> PushReport {
        let results: Vec<(String, Result<Delivery, PushError>)> = stream::iter(subscriptions)
            .map(|subscription| async move {
                let result = self.send(&subscription).await;
                (subscription.endpoint, result)
            })
            .buffer_unordered(MAX_IN_FLIGHT)
            .collect()
            .await;

        let mut report = PushReport::default();
        for (endpoint, result) in results {
            match result {
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::Gone) => match repo.delete_by_endpoint(&endpoint).await {
                    Ok(_) => report.removed += 1,
                    Err(e) => {
                        warn!(error = %e, "Failed to delete stale push subscription");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Push delivery failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

/// Origin of the push service, used as the VAPID audience.
fn push_audience(endpoint: &str) -> Result<String, PushError> {
    let url =
        url::Url::parse(endpoint).map_err(|_| PushError::InvalidEndpoint(endpoint.to_string()))?;
    if url.scheme() != "https" || url.host_str().is_none() {
        return Err(PushError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

fn classify(status: StatusCode) -> Result<Delivery, PushError> {
    if status.is_success() {
        Ok(Delivery::Sent)
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Ok(Delivery::Gone)
    } else {
        Err(PushError::Rejected(status))
    }
}

/// Whether `endpoint` looks like a push service URL we can deliver to.
#[must_use]
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    push_audience(endpoint).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_push_audience_is_origin() {
        assert_eq!(
            push_audience("https://fcm.googleapis.com/fcm/send/abc123").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            push_audience("https://push.example.net:8443/wpush/v2/xyz").unwrap(),
            "https://push.example.net:8443"
        );
    }

    #[test]
    fn test_push_audience_rejects_non_https() {
        assert!(push_audience("http://push.example.net/x").is_err());
        assert!(push_audience("not a url").is_err());
        assert!(!is_valid_endpoint("ftp://push.example.net/x"));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify(StatusCode::CREATED).unwrap(), Delivery::Sent);
        assert_eq!(classify(StatusCode::GONE).unwrap(), Delivery::Gone);
        assert_eq!(classify(StatusCode::NOT_FOUND).unwrap(), Delivery::Gone);
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS),
            Err(PushError::Rejected(StatusCode::TOO_MANY_REQUESTS))
        ));
    }

    #[test]
    fn test_disabled_sender() {
        let sender = PushSender::disabled();
        assert!(!sender.is_enabled());
        assert!(sender.public_key().is_none());
    }

    #[test]
    fn test_rejects_bad_private_key() {
        let config = PushConfig {
            public_key: "BKey".to_string(),
            private_key_pem: secrecy::SecretString::from("not a pem"),
            subject: "mailto:ops@example.com".to_string(),
        };
        assert!(matches!(
            PushSender::new(Some(&config)),
            Err(PushError::InvalidKey(_))
        ));
    }
}
