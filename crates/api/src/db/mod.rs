//! Database operations for the marketplace `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Accounts with argon2 password hashes and roles
//! - `categories`, `suppliers`, `products` - Catalog
//! - `reviews` - One review per (product, user)
//! - `orders`, `order_items` - Placed orders with price snapshots
//! - `conversations`, `messages` - User/supplier chat
//! - `contact_messages` - Contact form submissions
//! - `push_subscriptions`, `push_notifications` - Web Push
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate compiles
//! without a live database.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p marketplace-cli -- migrate
//! ```

pub mod categories;
pub mod chat;
pub mod contact;
pub mod orders;
pub mod products;
pub mod push;
pub mod reviews;
pub mod suppliers;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use categories::CategoryRepository;
pub use chat::ChatRepository;
pub use contact::ContactRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use push::PushRepository;
pub use reviews::ReviewRepository;
pub use suppliers::SupplierRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A value doesn't fit its column.
    #[error("{0}")]
    OutOfRange(String),
}

impl RepositoryError {
    /// Map unique and foreign-key violations to `Conflict`, anything else to `Database`.
    pub(crate) fn from_constraint(err: sqlx::Error, conflict: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(conflict.to_owned());
        }
        Self::Database(err)
    }
}

/// Page request shared by list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: i64,
    /// Rows per page.
    pub size: i64,
}

impl Page {
    /// Default page size.
    pub const DEFAULT_SIZE: i64 = 12;
    /// Largest page size a client may request.
    pub const MAX_SIZE: i64 = 100;
    /// Largest page number; keeps `offset` within `i64`.
    pub const MAX_NUMBER: i64 = i64::MAX / Self::MAX_SIZE;

    /// Build a page from optional query parameters, clamping out-of-range values.
    #[must_use]
    pub fn new(number: Option<i64>, size: Option<i64>) -> Self {
        Self {
            number: number.unwrap_or(1).clamp(1, Self::MAX_NUMBER),
            size: size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        }
    }

    /// Row offset for `OFFSET`.
    #[must_use]
    pub const fn offset(self) -> i64 {
        (self.number - 1).saturating_mul(self.size)
    }

    /// Number of pages needed to show `total` rows.
    #[must_use]
    pub const fn page_count(self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (total + self.size - 1) / self.size
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::new(None, None);
        assert_eq!(page.number, 1);
        assert_eq!(page.size, Page::DEFAULT_SIZE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_clamps_out_of_range() {
        let page = Page::new(Some(-4), Some(10_000));
        assert_eq!(page.number, 1);
        assert_eq!(page.size, Page::MAX_SIZE);

        assert_eq!(Page::new(Some(3), Some(0)).size, 1);
    }

    #[test]
    fn test_page_offset_and_count() {
        let page = Page::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);
        assert_eq!(page.page_count(0), 0);
        assert_eq!(page.page_count(10), 1);
        assert_eq!(page.page_count(21), 3);
    }

    #[test]
    fn test_huge_page_number_does_not_overflow() {
        let page = Page::new(Some(i64::MAX), Some(i64::MAX));
        assert_eq!(page.number, Page::MAX_NUMBER);
        assert_eq!(page.size, Page::MAX_SIZE);
        assert!(page.offset() > 0);
        assert_eq!(page.page_count(1), 1);
    }
}
