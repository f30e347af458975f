//! Supplier routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tracing::instrument;

use marketplace_core::{Email, SupplierId, UserId};

use super::Ack;
use crate::db::RepositoryError;
use crate::db::products::ProductRepository;
use crate::db::suppliers::SupplierRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Product, Supplier, SupplierInput};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(remove))
        .route("/{id}/products", get(products))
}

/// Supplier fields as sent by the admin UI.
#[derive(Debug, Deserialize)]
pub struct SupplierRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    /// Account that answers chats for this supplier.
    pub user_id: Option<UserId>,
}

impl SupplierRequest {
    fn validate(self) -> Result<SupplierInput> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Supplier name is required".to_string()));
        }
        let email = Email::parse(&self.email)
            .map_err(|e| AppError::BadRequest(format!("Invalid supplier email: {e}")))?;

        Ok(SupplierInput {
            name: name.to_string(),
            email,
            phone: non_blank(self.phone),
            address: non_blank(self.address),
            description: non_blank(self.description),
            user_id: self.user_id,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// GET /api/suppliers
async fn list(State(state): State<AppState>) -> Result<Json<Vec<Supplier>>> {
    Ok(Json(SupplierRepository::new(state.pool()).list().await?))
}

/// GET /api/suppliers/{id}
async fn show(State(state): State<AppState>, Path(id): Path<SupplierId>) -> Result<Json<Supplier>> {
    SupplierRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// GET /api/suppliers/{id}/products
async fn products(
    State(state): State<AppState>,
    Path(id): Path<SupplierId>,
) -> Result<Json<Vec<Product>>> {
    if SupplierRepository::new(state.pool()).get(id).await?.is_none() {
        return Err(not_found());
    }
    Ok(Json(ProductRepository::new(state.pool()).list_by_supplier(id).await?))
}

/// POST /api/suppliers
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<SupplierRequest>,
) -> Result<(StatusCode, Json<Supplier>)> {
    let input = body.validate()?;
    let supplier = SupplierRepository::new(state.pool())
        .create(&input)
        .await
        .map_err(map_repository)?;
    if let Some(user_id) = supplier.user_id {
        state.accounts().invalidate(user_id).await;
    }

    tracing::info!(supplier_id = %supplier.id, "Supplier created");
    Ok((StatusCode::CREATED, Json(supplier)))
}

/// PUT /api/suppliers/{id}
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SupplierId>,
    Json(body): Json<SupplierRequest>,
) -> Result<Json<Supplier>> {
    let input = body.validate()?;
    let supplier = SupplierRepository::new(state.pool())
        .update(id, &input)
        .await
        .map_err(map_repository)?;
    if let Some(user_id) = supplier.user_id {
        state.accounts().invalidate(user_id).await;
    }

    Ok(Json(supplier))
}

/// DELETE /api/suppliers/{id}
///
/// Products keep existing without a supplier; conversations are removed.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
async fn remove(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SupplierId>,
) -> Result<Json<Ack>> {
    if !SupplierRepository::new(state.pool()).delete(id).await? {
        return Err(not_found());
    }
    tracing::info!(supplier_id = %id, "Supplier deleted");
    Ok(Ack::new("Supplier removed"))
}

fn not_found() -> AppError {
    AppError::NotFound("Supplier not found".to_string())
}

fn map_repository(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => not_found(),
        RepositoryError::Conflict(msg) => AppError::Conflict(msg),
        other => other.into(),
    }
}
