//! Review repository.

use sqlx::{PgConnection, PgPool};

use marketplace_core::{ProductId, Rating, UserId};

use super::RepositoryError;
use crate::models::Review;

/// Repository for product review operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError> {
        let reviews = sqlx::query_as::<_, Review>(
            r"
            SELECT r.id, r.product_id, r.user_id, u.name AS user_name,
                   r.rating, r.comment, r.created_at
            FROM reviews r
            JOIN users u ON u.id = r.user_id
            WHERE r.product_id = $1
            ORDER BY r.created_at DESC, r.id DESC
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(reviews)
    }

    /// Add a review and refresh the product's rating aggregates atomically.
    ///
    /// The product row is locked for the duration of the transaction so
    /// concurrent reviews recompute the aggregates one after another.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the user already reviewed it.
    pub async fn create(
        &self,
        product_id: ProductId,
        user_id: UserId,
        rating: Rating,
        comment: &str,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<ProductId> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let already_reviewed: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE product_id = $1 AND user_id = $2)",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_reviewed {
            return Err(RepositoryError::Conflict("product already reviewed".to_owned()));
        }

        let review = sqlx::query_as::<_, Review>(
            r"
            WITH inserted AS (
                INSERT INTO reviews (product_id, user_id, rating, comment)
                VALUES ($1, $2, $3, $4)
                RETURNING id, product_id, user_id, rating, comment, created_at
            )
            SELECT i.id, i.product_id, i.user_id, u.name AS user_name,
                   i.rating, i.comment, i.created_at
            FROM inserted i
            JOIN users u ON u.id = i.user_id
            ",
        )
        .bind(product_id)
        .bind(user_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "product already reviewed"))?;

        refresh_ratings(&mut tx, &[product_id]).await?;

        tx.commit().await?;
        Ok(review)
    }
}

/// Recompute `rating` and `num_reviews` from the reviews of `products`.
///
/// Products left without reviews go back to a rating of 0.
pub(crate) async fn refresh_ratings(
    conn: &mut PgConnection,
    products: &[ProductId],
) -> Result<(), sqlx::Error> {
    if products.is_empty() {
        return Ok(());
    }
    let ids: Vec<i32> = products.iter().map(ProductId::as_i32).collect();

    sqlx::query(
        r"
        UPDATE products p
        SET num_reviews = COALESCE(agg.num_reviews, 0),
            rating = ROUND(COALESCE(agg.average, 0), 2),
            updated_at = NOW()
        FROM products target
        LEFT JOIN (
            SELECT product_id,
                   COUNT(*)::INTEGER AS num_reviews,
                   AVG(rating) AS average
            FROM reviews
            WHERE product_id = ANY($1)
            GROUP BY product_id
        ) agg ON agg.product_id = target.id
        WHERE target.id = ANY($1) AND p.id = target.id
        ",
    )
    .bind(ids)
    .execute(conn)
    .await?;

    Ok(())
}
