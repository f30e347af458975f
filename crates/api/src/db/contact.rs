//! Contact form repository.

use sqlx::PgPool;

use marketplace_core::ContactMessageId;

use super::RepositoryError;
use crate::models::{ContactMessage, NewContactMessage};

const CONTACT_COLUMNS: &str = "id, name, email, subject, message, is_read, created_at";

/// Repository for contact form submissions.
pub struct ContactRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ContactRepository<'a> {
    /// Create a new contact repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a submission.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(&self, new: &NewContactMessage) -> Result<ContactMessage, RepositoryError> {
        let message = sqlx::query_as::<_, ContactMessage>(&format!(
            r"
            INSERT INTO contact_messages (name, email, subject, message)
            VALUES ($1, $2, $3, $4)
            RETURNING {CONTACT_COLUMNS}
            "
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.subject.as_deref())
        .bind(&new.message)
        .fetch_one(self.pool)
        .await?;

        Ok(message)
    }

    /// List submissions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, unread_only: bool) -> Result<Vec<ContactMessage>, RepositoryError> {
        let messages = sqlx::query_as::<_, ContactMessage>(&format!(
            r"
            SELECT {CONTACT_COLUMNS} FROM contact_messages
            WHERE NOT ($1 AND is_read)
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(unread_only)
        .fetch_all(self.pool)
        .await?;

        Ok(messages)
    }

    /// Mark a submission as read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the submission doesn't exist.
    pub async fn mark_read(&self, id: ContactMessageId) -> Result<ContactMessage, RepositoryError> {
        sqlx::query_as::<_, ContactMessage>(&format!(
            "UPDATE contact_messages SET is_read = TRUE WHERE id = $1 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a submission.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: ContactMessageId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM contact_messages WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
