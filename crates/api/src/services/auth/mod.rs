//! Authentication service.
//!
//! Password accounts hashed with Argon2id and stateless HS256 access tokens.

mod error;
mod token;

pub use error::AuthError;
pub use token::{Claims, TokenKeys};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use marketplace_core::{Email, UserId, UserRole};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::{ProfileChanges, User};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Requested profile changes, before validation and hashing.
#[derive(Debug, Default)]
pub struct ProfileUpdate<'a> {
    pub name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub address: Option<&'a str>,
    pub password: Option<&'a str>,
}

/// Authentication service.
///
/// Handles registration, login, and profile changes.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    keys: &'a TokenKeys,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, keys: &'a TokenKeys) -> Self {
        Self {
            users: UserRepository::new(pool),
            keys,
        }
    }

    /// Register a new shopper account and issue a token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, String), AuthError> {
        let name = required("name", name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(name, &email, &password_hash, UserRole::User)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        let token = self.keys.issue(user.id, user.role)?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok((user, token))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), AuthError> {
        // A malformed email can't belong to an account
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        let token = self.keys.issue(user.id, user.role)?;
        Ok((user, token))
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Update the caller's own profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if a new password is too short.
    /// Returns `AuthError::UserNotFound` if the user no longer exists.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate<'_>,
    ) -> Result<User, AuthError> {
        let name = update.name.map(|n| required("name", n)).transpose()?;
        let password_hash = match update.password {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let changes = ProfileChanges {
            name: name.map(String::from),
            phone: update.phone.map(|p| p.trim().to_string()),
            address: update.address.map(|a| a.trim().to_string()),
            password_hash,
        };

        self.users
            .update_profile(user_id, &changes)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })
    }

    /// Create an account with a given role, for operator tooling.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn create_with_role(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let name = required("name", name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.users
            .create(name, &email, &password_hash, role)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }
}

/// Trim a required text field, rejecting blanks.
fn required<'s>(field: &str, value: &'s str) -> Result<&'s str, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::InvalidField(format!("{field} is required")));
    }
    Ok(value)
}

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_required_trims() {
        assert_eq!(required("name", "  Ada ").unwrap(), "Ada");
        assert!(matches!(
            required("name", "   "),
            Err(AuthError::InvalidField(msg)) if msg == "name is required"
        ));
    }
}
