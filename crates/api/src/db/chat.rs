//! Conversation and message repository.

use sqlx::PgPool;

use marketplace_core::{ConversationId, SupplierId, UserId};

use super::RepositoryError;
use crate::models::{Conversation, CurrentUser, Message};

const CONVERSATION_SELECT: &str = r"
    SELECT cv.id, cv.user_id, u.name AS user_name,
           cv.supplier_id, s.name AS supplier_name, s.user_id AS supplier_user_id,
           (SELECT m.content FROM messages m
            WHERE m.conversation_id = cv.id
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT 1) AS last_message,
           cv.created_at, cv.updated_at
    FROM conversations cv
    JOIN users u ON u.id = cv.user_id
    JOIN suppliers s ON s.id = cv.supplier_id
";

/// Repository for chat conversations and messages.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new chat repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Return the user's conversation with a supplier, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the supplier doesn't exist.
    pub async fn get_or_create(
        &self,
        user_id: UserId,
        supplier_id: SupplierId,
    ) -> Result<Conversation, RepositoryError> {
        let id: ConversationId = sqlx::query_scalar(
            r"
            INSERT INTO conversations (user_id, supplier_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, supplier_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(supplier_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "unknown supplier"))?;

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Get a conversation by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let conversation =
            sqlx::query_as::<_, Conversation>(&format!("{CONVERSATION_SELECT} WHERE cv.id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(conversation)
    }

    /// Conversations visible to `viewer`, most recent activity first.
    ///
    /// Admins see every conversation; others see those they started and
    /// those of the supplier they answer for.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for(&self, viewer: CurrentUser) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = if viewer.is_admin() {
            sqlx::query_as::<_, Conversation>(&format!(
                "{CONVERSATION_SELECT} ORDER BY cv.updated_at DESC, cv.id DESC"
            ))
            .fetch_all(self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Conversation>(&format!(
                r"{CONVERSATION_SELECT}
                WHERE cv.user_id = $1 OR s.user_id = $1
                ORDER BY cv.updated_at DESC, cv.id DESC"
            ))
            .bind(viewer.id)
            .fetch_all(self.pool)
            .await?
        };

        Ok(conversations)
    }

    /// Messages of a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = sqlx::query_as::<_, Message>(
            r"
            SELECT m.id, m.conversation_id, m.sender_id, u.name AS sender_name,
                   m.content, m.created_at
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = $1
            ORDER BY m.created_at ASC, m.id ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(self.pool)
        .await?;

        Ok(messages)
    }

    /// Store a message and bump the conversation's activity time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn create_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, Message>(
            r"
            WITH inserted AS (
                INSERT INTO messages (conversation_id, sender_id, content)
                VALUES ($1, $2, $3)
                RETURNING id, conversation_id, sender_id, content, created_at
            )
            SELECT i.id, i.conversation_id, i.sender_id, u.name AS sender_name,
                   i.content, i.created_at
            FROM inserted i
            JOIN users u ON u.id = i.sender_id
            ",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }
}
