//! Account routes: registration, login, and the caller's profile.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::{RequireAuth, auth_rate_limiter};
use crate::models::User;
use crate::services::auth::{AuthService, ProfileUpdate};
use crate::state::AppState;

/// Auth routes. Register and login are rate limited per client IP.
pub fn routes(trust_proxy: bool) -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .layer(auth_rate_limiter(trust_proxy))
        .route("/me", get(me).put(update_me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token plus the account it was issued for.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

/// Create a shopper account.
///
/// POST /api/auth/register
#[instrument(skip(state, body))]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let auth = AuthService::new(state.pool(), state.tokens());
    let (user, token) = auth.register(&body.name, &body.email, &body.password).await?;
    state.accounts().remember(user.id, user.role).await;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// Sign in with email and password.
///
/// POST /api/auth/login
#[instrument(skip(state, body))]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let auth = AuthService::new(state.pool(), state.tokens());
    let (user, token) = auth.login(&body.email, &body.password).await?;
    state.accounts().remember(user.id, user.role).await;

    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/auth/me
async fn me(RequireAuth(current): RequireAuth, State(state): State<AppState>) -> Result<Json<User>> {
    let auth = AuthService::new(state.pool(), state.tokens());
    Ok(Json(auth.get_user(current.id).await?))
}

/// PUT /api/auth/me
#[instrument(skip(state, body), fields(user_id = %current.id))]
async fn update_me(
    RequireAuth(current): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    let auth = AuthService::new(state.pool(), state.tokens());
    let update = ProfileUpdate {
        name: body.name.as_deref(),
        phone: body.phone.as_deref(),
        address: body.address.as_deref(),
        // An empty password field means "unchanged"
        password: body.password.as_deref().filter(|p| !p.is_empty()),
    };

    Ok(Json(auth.update_profile(current.id, update).await?))
}
