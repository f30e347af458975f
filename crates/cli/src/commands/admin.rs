//! Admin account commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new admin account
//! mp-cli admin create -e admin@example.com -n "Admin Name" -p 'a long password'
//!
//! # Promote an existing account
//! mp-cli admin promote -e someone@example.com
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETPLACE_DATABASE_URL` - `PostgreSQL` connection string
//! - `MARKETPLACE_JWT_SECRET` - Same secret the API uses (account creation goes
//!   through the API's auth service)

use marketplace_api::config::ApiConfig;
use marketplace_api::db::UserRepository;
use marketplace_api::services::auth::{AuthService, TokenKeys};
use marketplace_core::{Email, UserRole};
use thiserror::Error;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Configuration error: {0}")]
    Config(#[from] marketplace_api::config::ConfigError),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("{0}")]
    Auth(#[from] marketplace_api::services::auth::AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] marketplace_api::db::RepositoryError),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No account with email: {0}")]
    UserNotFound(String),
}

/// Create an admin account with a password.
///
/// # Errors
///
/// Returns `AdminError::Auth` for invalid input or an existing email.
pub async fn create(email: &str, name: &str, password: &str) -> Result<(), AdminError> {
    let config = ApiConfig::from_env()?;
    let keys = TokenKeys::new(&config.jwt_secret, config.token_ttl_hours);
    let pool = super::connect()
        .await
        .map_err(|e| AdminError::Connect(e.to_string()))?;

    let user = AuthService::new(&pool, &keys)
        .create_with_role(name, email, password, UserRole::Admin)
        .await?;

    tracing::info!(
        "Admin account created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(())
}

/// Give an existing account the admin role.
///
/// # Errors
///
/// Returns `AdminError::UserNotFound` if no account uses `email`.
pub async fn promote(email: &str) -> Result<(), AdminError> {
    let parsed = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let pool = super::connect()
        .await
        .map_err(|e| AdminError::Connect(e.to_string()))?;

    let users = UserRepository::new(&pool);
    let user = users
        .get_by_email(&parsed)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(email.to_owned()))?;

    if user.role.is_admin() {
        tracing::info!("{} is already an admin", user.email);
        return Ok(());
    }

    let user = users.set_role(user.id, UserRole::Admin).await?;
    tracing::info!("Promoted {} (ID {}) to admin", user.email, user.id);
    Ok(())
}
