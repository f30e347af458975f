//! Admin user management routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, put},
};
use serde::Deserialize;
use tracing::instrument;

use marketplace_core::{UserId, UserRole};

use super::Ack;
use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::User;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{id}", delete(remove))
        .route("/{id}/role", put(set_role))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

/// GET /api/users
async fn list(RequireAdmin(_): RequireAdmin, State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(UserRepository::new(state.pool()).list().await?))
}

/// PUT /api/users/{id}/role
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, role = %body.role))]
async fn set_role(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>> {
    if id == admin.id && !body.role.is_admin() {
        return Err(AppError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    let user = UserRepository::new(state.pool())
        .set_role(id, body.role)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("User not found".to_string()),
            other => other.into(),
        })?;
    state.accounts().remember(user.id, user.role).await;

    tracing::info!(user_id = %user.id, "User role changed");
    Ok(Json(user))
}

/// DELETE /api/users/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
async fn remove(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<Ack>> {
    if id == admin.id {
        return Err(AppError::BadRequest("Cannot delete your own account".to_string()));
    }

    if !UserRepository::new(state.pool()).delete(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    state.accounts().forget(id).await;

    tracing::info!(user_id = %id, "User deleted");
    Ok(Ack::new("User removed"))
}
