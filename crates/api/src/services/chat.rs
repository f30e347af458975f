//! User/supplier chat: access rules and the in-process room hub.
//!
//! Messages are persisted through [`ChatRepository`] and then fanned out to
//! live listeners through [`ChatHub`]. The hub is best effort: listeners that
//! fall behind skip events, and nothing is replayed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use marketplace_core::{ConversationId, SupplierId};

use crate::db::{ChatRepository, RepositoryError, SupplierRepository};
use crate::models::{ChatEvent, Conversation, CurrentUser, Message};

/// Buffered events per room before slow listeners start lagging.
pub const ROOM_CAPACITY: usize = 64;

/// Longest accepted message, in characters.
const MAX_MESSAGE_CHARS: usize = 4000;

// =============================================================================
// Hub
// =============================================================================

/// Registry of broadcast rooms, one per conversation.
///
/// Cloning is cheap; all clones share the same rooms.
#[derive(Clone, Default)]
pub struct ChatHub {
    rooms: Arc<Mutex<HashMap<ConversationId, broadcast::Sender<ChatEvent>>>>,
}

impl ChatHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a conversation room.
    #[must_use]
    pub fn subscribe(&self, id: ConversationId) -> RoomSubscription {
        let receiver = self
            .lock()
            .entry(id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe();

        RoomSubscription {
            receiver: Some(receiver),
            hub: self.clone(),
            id,
        }
    }

    /// Send an event to everyone in its room.
    ///
    /// Returns how many listeners received it.
    pub fn publish(&self, event: ChatEvent) -> usize {
        let id = event.conversation_id();
        let mut rooms = self.lock();
        let Some(sender) = rooms.get(&id) else {
            return 0;
        };

        match sender.send(event) {
            Ok(listeners) => listeners,
            Err(_) => {
                rooms.remove(&id);
                0
            }
        }
    }

    /// Number of rooms with a live channel.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop a room once its last listener has left.
    fn prune(&self, id: ConversationId) {
        let mut rooms = self.lock();
        if rooms.get(&id).is_some_and(|s| s.receiver_count() == 0) {
            rooms.remove(&id);
            debug!(conversation_id = %id, "Chat room closed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, broadcast::Sender<ChatEvent>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A listener in one room. Leaving (dropping) closes the room if it was the last.
pub struct RoomSubscription {
    receiver: Option<broadcast::Receiver<ChatEvent>>,
    hub: ChatHub,
    id: ConversationId,
}

impl RoomSubscription {
    /// Wait for the next event.
    ///
    /// Returns `None` once the room is closed. Events missed while lagging
    /// are skipped.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(conversation_id = %self.id, skipped, "Chat listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        self.hub.prune(self.id);
    }
}

// =============================================================================
// Service
// =============================================================================

/// Errors from chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Conversation doesn't exist.
    #[error("conversation not found")]
    NotFound,

    /// Supplier to start a conversation with doesn't exist.
    #[error("supplier not found")]
    SupplierNotFound,

    /// Caller is not a participant.
    #[error("not a participant in this conversation")]
    Forbidden,

    /// Message text is blank or too long.
    #[error("{0}")]
    InvalidMessage(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Chat service.
pub struct ChatService<'a> {
    chats: ChatRepository<'a>,
    suppliers: SupplierRepository<'a>,
    hub: &'a ChatHub,
}

impl<'a> ChatService<'a> {
    /// Create a new chat service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, hub: &'a ChatHub) -> Self {
        Self {
            chats: ChatRepository::new(pool),
            suppliers: SupplierRepository::new(pool),
            hub,
        }
    }

    /// Open (or reopen) the caller's conversation with a supplier.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::SupplierNotFound` if the supplier doesn't exist.
    pub async fn start(
        &self,
        caller: CurrentUser,
        supplier_id: SupplierId,
    ) -> Result<Conversation, ChatError> {
        if self.suppliers.get(supplier_id).await?.is_none() {
            return Err(ChatError::SupplierNotFound);
        }

        self.chats
            .get_or_create(caller.id, supplier_id)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => ChatError::SupplierNotFound,
                other => ChatError::Repository(other),
            })
    }

    /// Conversations visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Repository` if the query fails.
    pub async fn list(&self, caller: CurrentUser) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.chats.list_for(caller).await?)
    }

    /// Load a conversation the caller may access.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::NotFound` or `ChatError::Forbidden`.
    pub async fn authorize(
        &self,
        caller: CurrentUser,
        id: ConversationId,
    ) -> Result<Conversation, ChatError> {
        let conversation = self.chats.get(id).await?.ok_or(ChatError::NotFound)?;
        if !(caller.is_admin() || conversation.is_participant(caller.id)) {
            return Err(ChatError::Forbidden);
        }
        Ok(conversation)
    }

    /// Message history of a conversation.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::NotFound` or `ChatError::Forbidden`.
    pub async fn messages(
        &self,
        caller: CurrentUser,
        id: ConversationId,
    ) -> Result<Vec<Message>, ChatError> {
        self.authorize(caller, id).await?;
        Ok(self.chats.list_messages(id).await?)
    }

    /// Post a message and broadcast it to the room.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidMessage` for blank or oversized text.
    /// Returns `ChatError::NotFound` or `ChatError::Forbidden`.
    #[instrument(skip(self, content), fields(user_id = %caller.id))]
    pub async fn send(
        &self,
        caller: CurrentUser,
        id: ConversationId,
        content: &str,
    ) -> Result<Message, ChatError> {
        let content = validate_message(content)?;
        self.authorize(caller, id).await?;

        let message = self.chats.create_message(id, caller.id, content).await?;
        let listeners = self.hub.publish(ChatEvent::NewMessage {
            message: message.clone(),
        });
        debug!(message_id = %message.id, listeners, "Chat message broadcast");

        Ok(message)
    }
}

fn validate_message(content: &str) -> Result<&str, ChatError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::InvalidMessage("message content is required".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::InvalidMessage(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use marketplace_core::{MessageId, UserId};

    use super::*;

    fn event(conversation: i32, content: &str) -> ChatEvent {
        ChatEvent::NewMessage {
            message: Message {
                id: MessageId::new(1),
                conversation_id: ConversationId::new(conversation),
                sender_id: UserId::new(1),
                sender_name: "Ada".to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_room_only() {
        let hub = ChatHub::new();
        let mut room_one = hub.subscribe(ConversationId::new(1));
        let mut room_two = hub.subscribe(ConversationId::new(2));

        assert_eq!(hub.publish(event(1, "hello")), 1);

        let ChatEvent::NewMessage { message } = room_one.recv().await.unwrap();
        assert_eq!(message.content, "hello");

        let nothing =
            tokio::time::timeout(std::time::Duration::from_millis(20), room_two.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_every_listener_gets_event() {
        let hub = ChatHub::new();
        let mut first = hub.subscribe(ConversationId::new(7));
        let mut second = hub.subscribe(ConversationId::new(7));

        assert_eq!(hub.publish(event(7, "hi")), 2);
        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());
    }

    #[test]
    fn test_publish_without_listeners() {
        let hub = ChatHub::new();
        assert_eq!(hub.publish(event(3, "anyone?")), 0);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn test_room_closes_after_last_listener_leaves() {
        let hub = ChatHub::new();
        let first = hub.subscribe(ConversationId::new(4));
        let second = hub.subscribe(ConversationId::new(4));
        assert_eq!(hub.room_count(), 1);

        drop(first);
        assert_eq!(hub.room_count(), 1);
        drop(second);
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_listener_skips_missed_events() {
        let hub = ChatHub::new();
        let mut slow = hub.subscribe(ConversationId::new(5));

        for i in 0..(ROOM_CAPACITY + 10) {
            hub.publish(event(5, &i.to_string()));
        }

        let ChatEvent::NewMessage { message } = slow.recv().await.unwrap();
        assert_eq!(message.content, "10");
    }

    #[test]
    fn test_validate_message() {
        assert_eq!(validate_message("  hi  ").unwrap(), "hi");
        assert!(matches!(validate_message("   "), Err(ChatError::InvalidMessage(_))));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(validate_message(&long), Err(ChatError::InvalidMessage(_))));
    }
}
