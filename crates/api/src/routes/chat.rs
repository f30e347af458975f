//! Chat routes: conversations, messages, and the live event stream.
//!
//! Live updates use Server-Sent Events. Browsers open
//! `GET /api/conversations/{id}/events?access_token=...` with an
//! `EventSource`, which can't send an `Authorization` header.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::instrument;

use marketplace_core::{ConversationId, SupplierId};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Conversation, Message};
use crate::services::chat::ChatService;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(start))
        .route("/{id}/messages", get(messages).post(send))
        .route("/{id}/events", get(events))
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub supplier_id: SupplierId,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub content: String,
}

/// POST /api/conversations
async fn start(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<Json<Conversation>> {
    let chat = ChatService::new(state.pool(), state.chat());
    Ok(Json(chat.start(user, body.supplier_id).await?))
}

/// GET /api/conversations
async fn list(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>> {
    let chat = ChatService::new(state.pool(), state.chat());
    Ok(Json(chat.list(user).await?))
}

/// GET /api/conversations/{id}/messages
async fn messages(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<Vec<Message>>> {
    let chat = ChatService::new(state.pool(), state.chat());
    Ok(Json(chat.messages(user, id).await?))
}

/// POST /api/conversations/{id}/messages
async fn send(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Json(body): Json<SendRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    let chat = ChatService::new(state.pool(), state.chat());
    let message = chat.send(user, id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/conversations/{id}/events
///
/// Joins the conversation room and forwards every event until the client
/// disconnects. Slow clients skip events they fell behind on.
#[instrument(skip(state), fields(user_id = %user.id))]
async fn events(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    ChatService::new(state.pool(), state.chat())
        .authorize(user, id)
        .await?;

    let mut room = state.chat().subscribe(id);
    tracing::debug!(conversation_id = %id, "Joined chat room");

    let stream = async_stream::stream! {
        while let Some(event) = room.recv().await {
            match Event::default().event(event.name()).json_data(&event) {
                Ok(sse) => yield Ok::<_, Infallible>(sse),
                Err(e) => tracing::warn!(error = %e, "Failed to encode chat event"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
