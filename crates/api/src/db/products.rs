//! Product repository.
//!
//! Listing queries are assembled with `sqlx::QueryBuilder` so every filter
//! value is bound as a parameter.

use sqlx::{PgPool, Postgres, QueryBuilder};

use marketplace_core::{ProductId, SupplierId};

use super::{Page, RepositoryError};
use crate::models::{NewProduct, Product, ProductChanges, ProductFilter};

const PRODUCT_SELECT: &str = r"
    SELECT p.id, p.name, p.description, p.price, p.stock, p.image,
           p.category_id, c.name AS category_name,
           p.supplier_id, s.name AS supplier_name,
           p.rating, p.num_reviews, p.created_at, p.updated_at
    FROM products p
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN suppliers s ON s.id = p.supplier_id
";

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Append `WHERE` conditions for a filter.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND p.category_id = ").push_bind(category_id);
    }
    if let Some(supplier_id) = filter.supplier_id {
        qb.push(" AND p.supplier_id = ").push_bind(supplier_id);
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List one page of products matching `filter`, with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(PRODUCT_SELECT);
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY ")
            .push(filter.sort.order_by())
            .push(" LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let products = qb
            .build_query_as::<Product>()
            .fetch_all(self.pool)
            .await?;

        Ok((products, total))
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(product)
    }

    /// Highest rated products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "{PRODUCT_SELECT} ORDER BY p.rating DESC, p.num_reviews DESC, p.id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// All products of one supplier, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_supplier(
        &self,
        supplier_id: SupplierId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "{PRODUCT_SELECT} WHERE p.supplier_id = $1 ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(supplier_id)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the category or supplier doesn't exist.
    pub async fn create(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        let id: ProductId = sqlx::query_scalar(
            r"
            INSERT INTO products (name, description, price, stock, image, category_id, supplier_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.stock)
        .bind(&new.image)
        .bind(new.category_id)
        .bind(new.supplier_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "unknown category or supplier"))?;

        self.get(id).await?.ok_or_else(|| {
            RepositoryError::DataCorruption(format!("product {id} vanished after insert"))
        })
    }

    /// Apply partial changes to a product.
    ///
    /// Returns the updated product and the replaced image path when the image changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the category or supplier doesn't exist.
    pub async fn update(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<(Product, Option<String>), RepositoryError> {
        let previous_image: String =
            sqlx::query_scalar("SELECT image FROM products WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            r"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                stock = COALESCE($5, stock),
                image = COALESCE($6, image),
                category_id = COALESCE($7, category_id),
                supplier_id = COALESCE($8, supplier_id),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.price)
        .bind(changes.stock)
        .bind(changes.image.as_deref())
        .bind(changes.category_id)
        .bind(changes.supplier_id)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "unknown category or supplier"))?;

        let product = self.get(id).await?.ok_or(RepositoryError::NotFound)?;
        let replaced = changes.image.as_ref().map(|_| previous_image);
        Ok((product, replaced))
    }

    /// Delete a product, returning its image path.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if orders still reference the product.
    pub async fn delete(&self, id: ProductId) -> Result<Option<String>, RepositoryError> {
        let image: Option<String> =
            sqlx::query_scalar("DELETE FROM products WHERE id = $1 RETURNING image")
                .bind(id)
                .fetch_optional(self.pool)
                .await
                .map_err(|e| {
                    RepositoryError::from_constraint(e, "product is referenced by existing orders")
                })?;

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("mug"), "mug");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_filters_bind_values() {
        let filter = ProductFilter {
            search: Some("  tea ".to_string()),
            category_id: Some(marketplace_core::CategoryId::new(2)),
            ..ProductFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut qb, &filter);

        let sql = qb.sql();
        assert!(sql.contains("p.name ILIKE $1 OR p.description ILIKE $2"));
        assert!(sql.contains("p.category_id = $3"));
        assert!(!sql.contains("tea"));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = ProductFilter {
            search: Some("   ".to_string()),
            ..ProductFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM products p");
        push_filters(&mut qb, &filter);
        assert!(!qb.sql().contains("ILIKE"));
    }
}
