//! Contact form messages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketplace_core::{ContactMessageId, Email};

/// A stored contact form submission.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactMessage {
    pub id: ContactMessageId,
    pub name: String,
    pub email: Email,
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated contact form submission.
#[derive(Debug, Clone)]
pub struct NewContactMessage {
    pub name: String,
    pub email: Email,
    pub subject: Option<String>,
    pub message: String,
}
