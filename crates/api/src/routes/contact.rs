//! Contact form routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use tracing::instrument;

use marketplace_core::{ContactMessageId, Email};

use super::Ack;
use crate::db::RepositoryError;
use crate::db::contact::ContactRepository;
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, contact_rate_limiter};
use crate::models::{ContactMessage, NewContactMessage};
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 5000;

pub fn routes(trust_proxy: bool) -> Router<AppState> {
    Router::new()
        .route("/", get(list).merge(post(submit).layer(contact_rate_limiter(trust_proxy))))
        .route("/{id}", delete(remove))
        .route("/{id}/read", put(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ContactRequest {
    fn validate(self) -> Result<NewContactMessage> {
        let name = self.name.trim();
        let message = self.message.trim();
        if name.is_empty() || message.is_empty() {
            return Err(AppError::BadRequest(
                "Name, email and message are required".to_string(),
            ));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::BadRequest(format!(
                "Message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let email = Email::parse(&self.email)
            .map_err(|_| AppError::BadRequest("Please enter a valid email address".to_string()))?;

        Ok(NewContactMessage {
            name: name.to_string(),
            email,
            subject: self
                .subject
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactListQuery {
    #[serde(default)]
    pub unread: bool,
}

/// POST /api/contact
#[instrument(skip(state, body))]
async fn submit(
    State(state): State<AppState>,
    Json(body): Json<ContactRequest>,
) -> Result<(StatusCode, Json<Ack>)> {
    let new = body.validate()?;
    let stored = ContactRepository::new(state.pool()).create(&new).await?;

    tracing::info!(contact_id = %stored.id, "Contact message received");
    Ok((StatusCode::CREATED, Ack::new("Message sent successfully")))
}

/// GET /api/contact
async fn list(
    RequireAdmin(_): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<ContactListQuery>,
) -> Result<Json<Vec<ContactMessage>>> {
    Ok(Json(ContactRepository::new(state.pool()).list(query.unread).await?))
}

/// PUT /api/contact/{id}/read
async fn mark_read(
    RequireAdmin(_): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ContactMessageId>,
) -> Result<Json<ContactMessage>> {
    ContactRepository::new(state.pool())
        .mark_read(id)
        .await
        .map(Json)
        .map_err(|e| match e {
            RepositoryError::NotFound => not_found(),
            other => other.into(),
        })
}

/// DELETE /api/contact/{id}
async fn remove(
    RequireAdmin(_): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ContactMessageId>,
) -> Result<Json<Ack>> {
    if !ContactRepository::new(state.pool()).delete(id).await? {
        return Err(not_found());
    }
    Ok(Ack::new("Message removed"))
}

fn not_found() -> AppError {
    AppError::NotFound("Message not found".to_string())
}
