//! Category repository.

use sqlx::PgPool;

use marketplace_core::CategoryId;

use super::RepositoryError;
use crate::models::{Category, CategoryInput};

const CATEGORY_COLUMNS: &str = "id, name, description, image, created_at, updated_at";

/// Repository for category database operations.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all categories alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    /// Get a category by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(category)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create(&self, input: &CategoryInput) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(&format!(
            r"
            INSERT INTO categories (name, description, image)
            VALUES ($1, $2, $3)
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(input.description.as_deref())
        .bind(input.image.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "category name already exists"))
    }

    /// Update a category. A `None` image keeps the current one.
    ///
    /// Returns the updated category and the replaced image path, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new name is taken.
    pub async fn update(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<(Category, Option<String>), RepositoryError> {
        let previous = self.get(id).await?.ok_or(RepositoryError::NotFound)?;

        let category = sqlx::query_as::<_, Category>(&format!(
            r"
            UPDATE categories
            SET name = $2,
                description = $3,
                image = COALESCE($4, image),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.description.as_deref())
        .bind(input.image.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "category name already exists"))?
        .ok_or(RepositoryError::NotFound)?;

        let replaced = previous.image.filter(|_| input.image.is_some());
        Ok((category, replaced))
    }

    /// Delete a category. Products in it become uncategorized.
    ///
    /// Returns the deleted category so its image can be removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "DELETE FROM categories WHERE id = $1 RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(category)
    }
}
