//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketplace_core::{Email, UserId, UserRole};

/// A marketplace account.
///
/// The password hash is never part of this type; it is only read by
/// `UserRepository::get_password_hash` during login.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity carried by a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: UserRole,
}

impl CurrentUser {
    /// Whether this user has administrative access.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Whether this user may see a resource owned by `owner`.
    #[must_use]
    pub fn owns_or_admin(&self, owner: UserId) -> bool {
        self.id == owner || self.is_admin()
    }
}

/// Profile fields a user may change about themselves.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owns_or_admin() {
        let shopper = CurrentUser {
            id: UserId::new(1),
            role: UserRole::User,
        };
        let admin = CurrentUser {
            id: UserId::new(2),
            role: UserRole::Admin,
        };

        assert!(shopper.owns_or_admin(UserId::new(1)));
        assert!(!shopper.owns_or_admin(UserId::new(3)));
        assert!(admin.owns_or_admin(UserId::new(3)));
    }
}
