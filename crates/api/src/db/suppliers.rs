//! Supplier repository.

use sqlx::PgPool;

use marketplace_core::{SupplierId, UserId, UserRole};

use super::RepositoryError;
use crate::models::{Supplier, SupplierInput};

const SUPPLIER_COLUMNS: &str =
    "id, name, email, phone, address, description, user_id, created_at, updated_at";

/// Repository for supplier database operations.
pub struct SupplierRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SupplierRepository<'a> {
    /// Create a new supplier repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all suppliers alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Supplier>, RepositoryError> {
        let suppliers = sqlx::query_as::<_, Supplier>(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers ORDER BY name ASC, id ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(suppliers)
    }

    /// Get a supplier by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: SupplierId) -> Result<Option<Supplier>, RepositoryError> {
        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(supplier)
    }

    /// Create a supplier. A linked account is promoted to the supplier role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email or linked account is
    /// already used, or the linked account does not exist.
    pub async fn create(&self, input: &SupplierInput) -> Result<Supplier, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            r"
            INSERT INTO suppliers (name, email, phone, address, description, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SUPPLIER_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.phone.as_deref())
        .bind(input.address.as_deref())
        .bind(input.description.as_deref())
        .bind(input.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "supplier email or account already in use"))?;

        if let Some(user_id) = input.user_id {
            promote_to_supplier(&mut tx, user_id).await?;
        }

        tx.commit().await?;
        Ok(supplier)
    }

    /// Replace a supplier's fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the supplier doesn't exist.
    /// Returns `RepositoryError::Conflict` on a duplicate email or account.
    pub async fn update(
        &self,
        id: SupplierId,
        input: &SupplierInput,
    ) -> Result<Supplier, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            r"
            UPDATE suppliers
            SET name = $2, email = $3, phone = $4, address = $5,
                description = $6, user_id = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {SUPPLIER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.phone.as_deref())
        .bind(input.address.as_deref())
        .bind(input.description.as_deref())
        .bind(input.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "supplier email or account already in use"))?
        .ok_or(RepositoryError::NotFound)?;

        if let Some(user_id) = input.user_id {
            promote_to_supplier(&mut tx, user_id).await?;
        }

        tx.commit().await?;
        Ok(supplier)
    }

    /// Delete a supplier. Its products are kept without a supplier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: SupplierId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Give a linked account the supplier role unless it is an admin.
async fn promote_to_supplier(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 AND role = $3")
        .bind(user_id)
        .bind(UserRole::Supplier)
        .bind(UserRole::User)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
