//! Authentication extractors.
//!
//! Tokens are read from the `Authorization: Bearer <token>` header. Browsers
//! can't set headers on an `EventSource`, so an `access_token` query
//! parameter is accepted as a fallback.
//!
//! A valid signature only identifies the caller. The account must still exist
//! and its role is read from the account cache, so demotions and deletions
//! take effect before the token expires.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::{AppError, set_sentry_user};
use crate::models::CurrentUser;
use crate::services::auth::AuthError;
use crate::state::AppState;

/// Query parameter carrying a token when headers can't be set.
const TOKEN_QUERY_PARAM: &str = "access_token";

/// Extractor that requires a valid access token.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireAuth(user): RequireAuth) -> String {
///     format!("Hello, user {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".to_string()))?;

        let state = AppState::from_ref(state);
        let claimed = state.tokens().verify(&token)?;
        let user = current_account(&state, claimed)
            .await?
            .ok_or(AuthError::AccountGone)?;
        set_sentry_user(&user.id);

        Ok(Self(user))
    }
}

/// Extractor that requires an admin access token.
///
/// Rejects with 401 when unauthenticated and 403 for non-admins.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Not authorized as an admin".to_string()));
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally identifies the caller.
///
/// Missing or invalid tokens and deleted accounts yield `None` instead of
/// rejecting the request.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let Some(claimed) = bearer_token(parts).and_then(|t| state.tokens().verify(&t).ok())
        else {
            return Ok(Self(None));
        };

        let user = current_account(&state, claimed).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Account lookup failed, treating caller as anonymous");
            None
        });
        Ok(Self(user))
    }
}

/// Rebuild the caller from the stored account, or `None` if it was deleted.
async fn current_account(
    state: &AppState,
    claimed: CurrentUser,
) -> Result<Option<CurrentUser>, crate::db::RepositoryError> {
    let role = state.accounts().role(state.pool(), claimed.id).await?;
    Ok(role.map(|role| CurrentUser {
        id: claimed.id,
        role,
    }))
}

/// Token from the `Authorization` header, or the query string as a fallback.
fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|t| !t.is_empty())
}
