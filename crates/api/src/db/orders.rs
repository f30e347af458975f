//! Order repository: checkout transaction, status changes, listings.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};

use marketplace_core::{OrderId, OrderStatus, PaymentStatus, Price, UserId};

use super::{Page, RepositoryError};
use crate::models::{NewOrder, Order, OrderItem, OrderWithItems};

const ORDER_COLUMNS: &str = "id, user_id, shipping_address, payment_method, payment_status, \
                             status, total_price, paid_at, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, name, price, quantity";

/// Outcome of a status change request.
#[derive(Debug)]
pub enum StatusChange {
    /// The order moved to the requested status.
    Updated(Order),
    /// The transition is not allowed from the order's current status.
    Rejected { current: OrderStatus },
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order in a single transaction.
    ///
    /// Each line decrements stock with a `stock >= quantity` guard and stores
    /// a snapshot of the product's name and price. Any failure rolls the whole
    /// order back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if a product doesn't exist.
    /// Returns `RepositoryError::Conflict` if a product has too little stock.
    /// Returns `RepositoryError::OutOfRange` if the total can't be stored.
    pub async fn place(&self, new: &NewOrder) -> Result<OrderWithItems, RepositoryError> {
        let payment_status = new.initial_payment_status();
        let mut tx = self.pool.begin().await?;

        let order_id: OrderId = sqlx::query_scalar(
            r"
            INSERT INTO orders (user_id, shipping_address, payment_method, payment_status,
                                total_price, paid_at)
            VALUES ($1, $2, $3, $4, 0, CASE WHEN $4 = 'paid'::payment_status THEN NOW() END)
            RETURNING id
            ",
        )
        .bind(new.user_id)
        .bind(&new.shipping_address)
        .bind(new.payment_method)
        .bind(payment_status)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new.lines.len());
        for line in &new.lines {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                RepositoryError::Conflict(format!(
                    "insufficient stock for product {}",
                    line.product_id
                ))
            })?;

            let snapshot: Option<(String, Price)> = sqlx::query_as(
                r"
                UPDATE products
                SET stock = stock - $2, updated_at = NOW()
                WHERE id = $1 AND stock >= $2
                RETURNING name, price
                ",
            )
            .bind(line.product_id)
            .bind(quantity)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((name, price)) = snapshot else {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                        .bind(line.product_id)
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(if exists {
                    RepositoryError::Conflict(format!(
                        "insufficient stock for product {}",
                        line.product_id
                    ))
                } else {
                    RepositoryError::NotFound
                });
            };

            let item = sqlx::query_as::<_, OrderItem>(&format!(
                r"
                INSERT INTO order_items (order_id, product_id, name, price, quantity)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {ITEM_COLUMNS}
                "
            ))
            .bind(order_id)
            .bind(line.product_id)
            .bind(name)
            .bind(price)
            .bind(quantity)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        let total: Price = items
            .iter()
            .map(|item| item.price.line_total(item.quantity.unsigned_abs()))
            .sum();
        if total > Price::MAX {
            return Err(RepositoryError::OutOfRange(format!(
                "order total exceeds {}",
                Price::MAX
            )));
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET total_price = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(OrderWithItems { order, items })
    }

    /// A user's orders with their items, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        self.attach_items(orders).await
    }

    /// One order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_with_items(
        &self,
        id: OrderId,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(OrderWithItems { order, items }))
    }

    /// An order header.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// One page of all orders, optionally filtered by status, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<OrderWithItems>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::order_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(page.size)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((self.attach_items(orders).await?, total))
    }

    /// Move an order to `status` if the transition is allowed.
    ///
    /// Cancelling returns every item's quantity to stock in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: OrderStatus =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        if !current.can_transition_to(status) {
            return Ok(StatusChange::Rejected { current });
        }

        if status == OrderStatus::Cancelled {
            restock(&mut tx, id).await?;
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StatusChange::Updated(order))
    }

    /// Mark an order as paid. Paying twice keeps the first payment time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn mark_paid(&self, id: OrderId) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders
            SET payment_status = $2, paid_at = COALESCE(paid_at, NOW()), updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(PaymentStatus::Paid)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn attach_items(
        &self,
        orders: Vec<Order>,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = orders.iter().map(|o| o.id.as_i32()).collect();
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }
}

/// Return an order's quantities to product stock.
async fn restock(conn: &mut PgConnection, order_id: OrderId) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE products p
        SET stock = p.stock + returned.quantity, updated_at = NOW()
        FROM (
            SELECT product_id, SUM(quantity)::INTEGER AS quantity
            FROM order_items
            WHERE order_id = $1
            GROUP BY product_id
        ) returned
        WHERE p.id = returned.product_id
        ",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}
