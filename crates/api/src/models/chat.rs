//! Chat domain models for user/supplier conversations.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketplace_core::{ConversationId, MessageId, SupplierId, UserId};

/// A chat thread between a user and a supplier.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub user_name: String,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    /// Login account that answers for the supplier, if any.
    pub supplier_user_id: Option<UserId>,
    /// Preview of the newest message.
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever a message is posted.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `user_id` takes part in this conversation.
    #[must_use]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.user_id == user_id || self.supplier_user_id == Some(user_id)
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Event delivered to everyone listening on a conversation room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was posted.
    NewMessage { message: Message },
}

impl ChatEvent {
    /// SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
        }
    }

    /// Room this event belongs to.
    #[must_use]
    pub const fn conversation_id(&self) -> ConversationId {
        match self {
            Self::NewMessage { message } => message.conversation_id,
        }
    }
}
