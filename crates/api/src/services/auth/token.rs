//! Signed access tokens (HS256 JWT).

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use marketplace_core::{UserId, UserRole};

use super::AuthError;
use crate::models::CurrentUser;

/// Token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: UserId,
    pub role: UserRole,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Signing and verification keys plus the token lifetime.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    /// Build keys from the shared secret.
    #[must_use]
    pub fn new(secret: &SecretString, ttl_hours: i64) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a token for a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` if encoding fails.
    pub fn issue(&self, user_id: UserId, role: UserRole) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::TokenSigning)
    }

    /// Verify a token and return the identity it carries.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for bad signatures, malformed tokens,
    /// and expired tokens.
    pub fn verify(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(CurrentUser {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn keys(ttl_hours: i64) -> TokenKeys {
        TokenKeys::new(
            &SecretString::from("k7Qp2vXz9LmN4rT8wY1bC6dF3gH5jS0a"),
            ttl_hours,
        )
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = keys(1);
        let token = keys.issue(UserId::new(42), UserRole::Admin).unwrap();
        let user = keys.verify(&token).unwrap();
        assert_eq!(user.id, UserId::new(42));
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn test_rejects_tampered_token() {
        let keys = keys(1);
        let token = keys.issue(UserId::new(1), UserRole::User).unwrap();
        let other = TokenKeys::new(&SecretString::from("Zq8Wn3Lp6Rt1Yv5Bx2Mc9Kd4Hf7Gj0Sa"), 1);
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(keys.verify("not-a-token"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_rejects_expired_token() {
        // Beyond the default 60 second leeway
        let keys = keys(-1);
        let token = keys.issue(UserId::new(1), UserRole::User).unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::InvalidToken)));
    }
}
