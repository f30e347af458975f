//! Category routes. Reads are public and cached; writes are admin-only
//! multipart forms with an optional image.

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
};
use tracing::instrument;

use marketplace_core::CategoryId;

use super::{Ack, discard_upload_on_error};
use crate::db::RepositoryError;
use crate::db::categories::CategoryRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Category, CategoryInput};
use crate::services::uploads::ImageForm;
use crate::state::AppState;

const IMAGE_FIELD: &str = "image";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(remove))
}

/// GET /api/categories
async fn list(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let categories = state.categories().list(state.pool()).await?;
    Ok(Json(categories.as_ref().clone()))
}

/// GET /api/categories/{id}
async fn show(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Result<Json<Category>> {
    CategoryRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
}

/// POST /api/categories
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Category>)> {
    let form = state.images().read_form(multipart, IMAGE_FIELD).await?;

    let result = match category_input(&form) {
        Ok(input) => CategoryRepository::new(state.pool())
            .create(&input)
            .await
            .map_err(map_conflict),
        Err(e) => Err(e),
    };
    let category = discard_upload_on_error(&state, form.image.as_deref(), result).await?;

    state.categories().invalidate().await;
    tracing::info!(category_id = %category.id, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/categories/{id}
///
/// A new image replaces the stored one; omitting it keeps the current image.
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    multipart: Multipart,
) -> Result<Json<Category>> {
    let form = state.images().read_form(multipart, IMAGE_FIELD).await?;

    let result = match category_input(&form) {
        Ok(input) => CategoryRepository::new(state.pool())
            .update(id, &input)
            .await
            .map_err(map_conflict),
        Err(e) => Err(e),
    };
    let (category, replaced) =
        discard_upload_on_error(&state, form.image.as_deref(), result).await?;

    if let Some(old) = replaced {
        state.images().remove(&old).await;
    }
    state.categories().invalidate().await;
    Ok(Json(category))
}

/// DELETE /api/categories/{id}
///
/// Products in the category are kept and become uncategorized.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
async fn remove(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Ack>> {
    let category = CategoryRepository::new(state.pool())
        .delete(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    if let Some(image) = &category.image {
        state.images().remove(image).await;
    }
    state.categories().invalidate().await;
    tracing::info!(category_id = %id, "Category deleted");
    Ok(Ack::new("Category removed"))
}

fn category_input(form: &ImageForm) -> Result<CategoryInput> {
    let name = form
        .text("name")
        .ok_or_else(|| AppError::BadRequest("Category name is required".to_string()))?;

    Ok(CategoryInput {
        name: name.to_string(),
        description: form.text("description").map(String::from),
        image: form.image.clone(),
    })
}

fn map_conflict(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Category not found".to_string()),
        RepositoryError::Conflict(msg) => AppError::Conflict(msg),
        other => other.into(),
    }
}
