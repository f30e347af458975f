//! Product and review routes.
//!
//! Listings are public. Creating, editing, and deleting products takes an
//! admin token and a multipart form; reviews take any signed-in user.

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marketplace_core::{CategoryId, Price, ProductId, SupplierId};

use super::{Ack, clamp_limit, discard_upload_on_error};
use crate::db::products::ProductRepository;
use crate::db::{Page, RepositoryError};
use crate::error::{AppError, Result, capitalize};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{NewProduct, Product, ProductChanges, ProductFilter, ProductSort, Review};
use crate::services::reviews::ReviewService;
use crate::services::uploads::{ImageForm, UploadError};
use crate::state::AppState;

const IMAGE_FIELD: &str = "image";
const DEFAULT_TOP: i64 = 3;
const MAX_TOP: i64 = 20;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/top", get(top))
        .route("/{id}", get(show).put(update).delete(remove))
        .route("/{id}/reviews", get(reviews).post(add_review))
}

/// Listing query. Filters arrive as strings so that empty form values
/// (`?category=`) mean "no filter" instead of a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ProductQuery {
    fn filter(&self) -> Result<ProductFilter> {
        Ok(ProductFilter {
            search: non_blank(self.search.as_deref()).map(String::from),
            category_id: parse_id(self.category.as_deref(), "category")?.map(CategoryId::new),
            supplier_id: parse_id(self.supplier.as_deref(), "supplier")?.map(SupplierId::new),
            min_price: parse_price(self.min_price.as_deref())?,
            max_price: parse_price(self.max_price.as_deref())?,
            sort: self.sort,
        })
    }
}

/// One page of products.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub page: i64,
    pub pages: i64,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

/// GET /api/products
#[instrument(skip(state))]
async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>> {
    let filter = query.filter()?;
    let page = Page::new(query.page, query.limit);

    let (products, total) = ProductRepository::new(state.pool()).list(&filter, page).await?;

    Ok(Json(ProductPage {
        products,
        page: page.number,
        pages: page.page_count(total),
        total,
    }))
}

/// GET /api/products/top
async fn top(State(state): State<AppState>, Query(query): Query<TopQuery>) -> Result<Json<Vec<Product>>> {
    let limit = clamp_limit(query.limit, DEFAULT_TOP, MAX_TOP);
    Ok(Json(ProductRepository::new(state.pool()).top(limit).await?))
}

/// GET /api/products/{id}
async fn show(State(state): State<AppState>, Path(id): Path<ProductId>) -> Result<Json<Product>> {
    ProductRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// POST /api/products
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Product>)> {
    let form = state.images().read_form(multipart, IMAGE_FIELD).await?;
    let Some(image) = form.image.clone() else {
        return Err(UploadError::MissingFile("Product".to_string()).into());
    };

    let result = match new_product(&form, image) {
        Ok(new) => ProductRepository::new(state.pool())
            .create(&new)
            .await
            .map_err(map_repository),
        Err(e) => Err(e),
    };
    let product = discard_upload_on_error(&state, form.image.as_deref(), result).await?;

    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/products/{id}
///
/// Only the fields present in the form change. A new image replaces the
/// old file.
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Result<Json<Product>> {
    let form = state.images().read_form(multipart, IMAGE_FIELD).await?;

    let result = match product_changes(&form) {
        Ok(changes) if changes.is_empty() => {
            Err(AppError::BadRequest("No product fields to update".to_string()))
        }
        Ok(changes) => ProductRepository::new(state.pool())
            .update(id, &changes)
            .await
            .map_err(map_repository),
        Err(e) => Err(e),
    };
    let (product, replaced) =
        discard_upload_on_error(&state, form.image.as_deref(), result).await?;

    if let Some(old) = replaced {
        state.images().remove(&old).await;
    }
    Ok(Json(product))
}

/// DELETE /api/products/{id}
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
async fn remove(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Ack>> {
    let image = ProductRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(map_repository)?
        .ok_or_else(not_found)?;

    state.images().remove(&image).await;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(Ack::new("Product removed"))
}

/// GET /api/products/{id}/reviews
async fn reviews(State(state): State<AppState>, Path(id): Path<ProductId>) -> Result<Json<Vec<Review>>> {
    Ok(Json(ReviewService::new(state.pool()).list(id).await?))
}

/// POST /api/products/{id}/reviews
async fn add_review(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = ReviewService::new(state.pool())
        .create(user, id, body.rating, &body.comment)
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

// =============================================================================
// Form parsing
// =============================================================================

fn new_product(form: &ImageForm, image: String) -> Result<NewProduct> {
    let name = form
        .text("name")
        .ok_or_else(|| AppError::BadRequest("Product name is required".to_string()))?;
    let price = parse_price(form.text("price"))?
        .ok_or_else(|| AppError::BadRequest("Product price is required".to_string()))?;

    Ok(NewProduct {
        name: name.to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        price,
        stock: parse_stock(form.text("stock"))?.unwrap_or(0),
        image,
        category_id: parse_id(form.text("category_id"), "category")?.map(CategoryId::new),
        supplier_id: parse_id(form.text("supplier_id"), "supplier")?.map(SupplierId::new),
    })
}

fn product_changes(form: &ImageForm) -> Result<ProductChanges> {
    Ok(ProductChanges {
        name: form.text("name").map(String::from),
        description: form.text("description").map(String::from),
        price: parse_price(form.text("price"))?,
        stock: parse_stock(form.text("stock"))?,
        image: form.image.clone(),
        category_id: parse_id(form.text("category_id"), "category")?.map(CategoryId::new),
        supplier_id: parse_id(form.text("supplier_id"), "supplier")?.map(SupplierId::new),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_id(value: Option<&str>, what: &str) -> Result<Option<i32>> {
    non_blank(value)
        .map(|v| {
            v.parse::<i32>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid {what} id")))
        })
        .transpose()
}

fn parse_price(value: Option<&str>) -> Result<Option<Price>> {
    non_blank(value)
        .map(|v| Price::parse(v).map_err(|e| AppError::BadRequest(capitalize(&e.to_string()))))
        .transpose()
}

fn parse_stock(value: Option<&str>) -> Result<Option<i32>> {
    non_blank(value)
        .map(|v| {
            v.parse::<i32>()
                .ok()
                .filter(|stock| *stock >= 0)
                .ok_or_else(|| AppError::BadRequest("Stock must be a whole number of at least 0".to_string()))
        })
        .transpose()
}

fn not_found() -> AppError {
    AppError::NotFound("Product not found".to_string())
}

fn map_repository(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => not_found(),
        RepositoryError::Conflict(msg) => AppError::Conflict(msg),
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn form(fields: &[(&str, &str)], image: Option<&str>) -> ImageForm {
        let fields: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ImageForm::from_fields(fields, image.map(String::from))
    }

    #[test]
    fn test_query_blank_filters_are_ignored() {
        let query = ProductQuery {
            search: Some("  ".to_string()),
            category: Some(String::new()),
            min_price: Some("5".to_string()),
            ..ProductQuery::default()
        };
        let filter = query.filter().unwrap();
        assert!(filter.search.is_none());
        assert!(filter.category_id.is_none());
        assert_eq!(filter.min_price, Some(Price::parse("5").unwrap()));
    }

    #[test]
    fn test_query_rejects_bad_values() {
        let query = ProductQuery {
            category: Some("abc".to_string()),
            ..ProductQuery::default()
        };
        assert_eq!(query.filter().unwrap_err().status(), StatusCode::BAD_REQUEST);

        let query = ProductQuery {
            max_price: Some("-3".to_string()),
            ..ProductQuery::default()
        };
        assert!(query.filter().is_err());
    }

    #[test]
    fn test_new_product_requires_name_and_price() {
        let missing_price = form(&[("name", "Mug")], Some("/uploads/a.png"));
        assert!(new_product(&missing_price, "/uploads/a.png".to_string()).is_err());

        let ok = form(
            &[("name", "Mug"), ("price", "8.5"), ("stock", "4"), ("category_id", "2")],
            Some("/uploads/a.png"),
        );
        let product = new_product(&ok, "/uploads/a.png".to_string()).unwrap();
        assert_eq!(product.stock, 4);
        assert_eq!(product.category_id, Some(CategoryId::new(2)));
        assert!(product.supplier_id.is_none());
    }

    #[test]
    fn test_changes_only_include_sent_fields() {
        let changes = product_changes(&form(&[("stock", "0")], None)).unwrap();
        assert_eq!(changes.stock, Some(0));
        assert!(changes.name.is_none());
        assert!(product_changes(&form(&[("stock", "-1")], None)).is_err());
        assert!(product_changes(&form(&[], None)).unwrap().is_empty());
    }

    #[test]
    fn test_values_beyond_storage_limits_are_rejected() {
        let err = product_changes(&form(&[("price", "10000000000")], None)).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "Price cannot exceed 9999999999.99");

        assert!(product_changes(&form(&[("price", "9999999999.99")], None)).is_ok());
        assert!(product_changes(&form(&[("stock", "2147483648")], None)).is_err());
        assert!(product_changes(&form(&[("stock", "2147483647")], None)).is_ok());
    }
}
