//! Unified error handling with Sentry integration.
//!
//! Every route handler returns `Result<T, AppError>`. Server-side failures are
//! captured to Sentry and logged before a generic message is sent; client
//! errors carry a message that is safe to show. Bodies are always
//! `{"message": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::chat::ChatError;
use crate::services::orders::OrderError;
use crate::services::push::PushError;
use crate::services::reviews::ReviewError;
use crate::services::uploads::UploadError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Review operation failed.
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// Chat operation failed.
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    /// Upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Push delivery failed.
    #[error("Push error: {0}")]
    Push(#[from] PushError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with existing data.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::InvalidToken
                | AuthError::AccountGone => StatusCode::UNAUTHORIZED,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::InvalidField(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(err) => repository_status(err),
                AuthError::TokenSigning(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Order(err) => match err {
                OrderError::EmptyOrder
                | OrderError::InvalidQuantity
                | OrderError::MissingShippingAddress
                | OrderError::InvalidTransition { .. }
                | OrderError::PayCancelled => StatusCode::BAD_REQUEST,
                OrderError::ProductNotFound | OrderError::NotFound => StatusCode::NOT_FOUND,
                OrderError::InsufficientStock(_) => StatusCode::CONFLICT,
                OrderError::Repository(err) => repository_status(err),
            },
            Self::Review(err) => match err {
                ReviewError::InvalidRating(_)
                | ReviewError::CommentTooLong
                | ReviewError::AlreadyReviewed => StatusCode::BAD_REQUEST,
                ReviewError::ProductNotFound => StatusCode::NOT_FOUND,
                ReviewError::Repository(err) => repository_status(err),
            },
            Self::Chat(err) => match err {
                ChatError::NotFound | ChatError::SupplierNotFound => StatusCode::NOT_FOUND,
                ChatError::Forbidden => StatusCode::FORBIDDEN,
                ChatError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
                ChatError::Repository(err) => repository_status(err),
            },
            Self::Upload(err) => match err {
                UploadError::MissingFile(_) | UploadError::UnsupportedType => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::Multipart(err) => err.status(),
                UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Push(err) => match err {
                PushError::Disabled => StatusCode::NOT_FOUND,
                PushError::InvalidEndpoint(_) => StatusCode::BAD_REQUEST,
                PushError::Repository(err) => repository_status(err),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client. Server errors never expose details.
    #[must_use]
    pub fn client_message(&self) -> String {
        if self.status().is_server_error() {
            return "Internal server error".to_string();
        }

        match self {
            Self::Database(err)
            | Self::Auth(AuthError::Repository(err))
            | Self::Order(OrderError::Repository(err))
            | Self::Review(ReviewError::Repository(err))
            | Self::Chat(ChatError::Repository(err))
            | Self::Push(PushError::Repository(err)) => match err {
                RepositoryError::NotFound => "Not found".to_string(),
                RepositoryError::Conflict(msg) => msg.clone(),
                RepositoryError::OutOfRange(msg) => capitalize(msg),
                _ => "Internal server error".to_string(),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::InvalidToken => "Not authorized, token failed".to_string(),
                AuthError::AccountGone => "Not authorized, account no longer exists".to_string(),
                AuthError::UserNotFound => "User not found".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) | AuthError::InvalidField(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                _ => "Authentication error".to_string(),
            },
            Self::Order(err) => capitalize(&err.to_string()),
            Self::Review(err) => capitalize(&err.to_string()),
            Self::Chat(err) => capitalize(&err.to_string()),
            Self::Upload(UploadError::Multipart(err)) => err.body_text(),
            Self::Upload(err) => capitalize(&err.to_string()),
            Self::Push(err) => capitalize(&err.to_string()),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::OutOfRange(_) => StatusCode::BAD_REQUEST,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Uppercase the first character of a service error message.
pub(crate) fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            message: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called after token verification to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;
    use marketplace_core::{OrderStatus, Rating};

    use super::*;

    async fn body_message(err: AppError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, json["message"].as_str().unwrap().to_string())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::NotFound(String::new()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized(String::new()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden(String::new()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Conflict(String::new()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(OrderError::EmptyOrder).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(OrderError::InsufficientStock(String::new())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(ReviewError::AlreadyReviewed).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(UploadError::TooLarge { max_bytes: 1 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::from(RepositoryError::Conflict("taken".to_string())).status(),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_json_body_for_client_errors() {
        let (status, message) = body_message(AppError::from(OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Cannot change order status from delivered to pending");

        let (status, message) = body_message(AppError::from(OrderError::from(
            RepositoryError::OutOfRange("order total exceeds 9999999999.99".to_string()),
        )))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Order total exceeds 9999999999.99");

        let rating_err = Rating::new(7).unwrap_err();
        let (_, message) = body_message(AppError::from(ReviewError::from(rating_err))).await;
        assert_eq!(message, "Rating must be between 1 and 5, got 7");
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let (status, message) =
            body_message(AppError::Internal("connection string leaked".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");

        let (status, message) = body_message(AppError::Database(RepositoryError::DataCorruption(
            "bad row".to_string(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }
}
