//! Product reviews.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use marketplace_core::{ProductId, Rating, RatingError};

use crate::db::{RepositoryError, ReviewRepository};
use crate::models::{CurrentUser, Review};

/// Longest accepted review comment, in characters.
const MAX_COMMENT_CHARS: usize = 5000;

/// Errors from review operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Rating outside 1..=5.
    #[error(transparent)]
    InvalidRating(#[from] RatingError),

    /// Comment is too long.
    #[error("comment must be at most {MAX_COMMENT_CHARS} characters")]
    CommentTooLong,

    /// Reviewed product doesn't exist.
    #[error("product not found")]
    ProductNotFound,

    /// The user already reviewed this product.
    #[error("product already reviewed")]
    AlreadyReviewed,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Review service.
pub struct ReviewService<'a> {
    reviews: ReviewRepository<'a>,
}

impl<'a> ReviewService<'a> {
    /// Create a new review service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            reviews: ReviewRepository::new(pool),
        }
    }

    /// Reviews of a product.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Repository` if the query fails.
    pub async fn list(&self, product_id: ProductId) -> Result<Vec<Review>, ReviewError> {
        Ok(self.reviews.list_for_product(product_id).await?)
    }

    /// Submit a review.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidRating` for ratings outside 1..=5,
    /// `ReviewError::ProductNotFound` for unknown products, and
    /// `ReviewError::AlreadyReviewed` for a second review of the same product.
    #[instrument(skip(self, comment), fields(user_id = %author.id))]
    pub async fn create(
        &self,
        author: CurrentUser,
        product_id: ProductId,
        rating: i64,
        comment: &str,
    ) -> Result<Review, ReviewError> {
        let rating = Rating::new(rating)?;
        let comment = comment.trim();
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(ReviewError::CommentTooLong);
        }

        let review = self
            .reviews
            .create(product_id, author.id, rating, comment)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ReviewError::ProductNotFound,
                RepositoryError::Conflict(_) => ReviewError::AlreadyReviewed,
                other => ReviewError::Repository(other),
            })?;

        info!(review_id = %review.id, rating = rating.value(), "Review added");
        Ok(review)
    }
}
