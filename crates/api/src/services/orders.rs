//! Order placement and lifecycle.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use marketplace_core::{OrderId, OrderStatus, PaymentMethod};

use crate::db::orders::StatusChange;
use crate::db::{OrderRepository, Page, RepositoryError};
use crate::models::{CurrentUser, NewOrder, Order, OrderLine, OrderWithItems};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order has no items.
    #[error("order has no items")]
    EmptyOrder,

    /// An item asks for zero units.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Shipping address is blank.
    #[error("shipping address is required")]
    MissingShippingAddress,

    /// An ordered product doesn't exist.
    #[error("product not found")]
    ProductNotFound,

    /// Not enough stock for an item.
    #[error("{0}")]
    InsufficientStock(String),

    /// Order doesn't exist or isn't visible to the caller.
    #[error("order not found")]
    NotFound,

    /// Status change not allowed from the current status.
    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Cancelled orders can't be paid.
    #[error("cancelled orders cannot be paid")]
    PayCancelled,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Order service.
pub struct OrderService<'a> {
    orders: OrderRepository<'a>,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            orders: OrderRepository::new(pool),
        }
    }

    /// Validate and place an order for `customer`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyOrder` for an empty item list, and the
    /// validation, stock, or database error that aborted the order otherwise.
    #[instrument(skip(self, lines, shipping_address), fields(user_id = %customer.id, items = lines.len()))]
    pub async fn place(
        &self,
        customer: CurrentUser,
        lines: Vec<OrderLine>,
        shipping_address: &str,
        payment_method: PaymentMethod,
    ) -> Result<OrderWithItems, OrderError> {
        let new = validate_order(customer, lines, shipping_address, payment_method)?;

        let placed = self.orders.place(&new).await.map_err(|e| match e {
            RepositoryError::NotFound => OrderError::ProductNotFound,
            RepositoryError::Conflict(msg) => OrderError::InsufficientStock(msg),
            other => OrderError::Repository(other),
        })?;

        info!(
            order_id = %placed.order.id,
            total = %placed.order.total_price,
            "Order placed"
        );
        Ok(placed)
    }

    /// The caller's orders.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list_mine(&self, customer: CurrentUser) -> Result<Vec<OrderWithItems>, OrderError> {
        Ok(self.orders.list_for_user(customer.id).await?)
    }

    /// One order, visible to its owner and admins only.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order doesn't exist or belongs
    /// to someone else.
    pub async fn get_for(
        &self,
        viewer: CurrentUser,
        id: OrderId,
    ) -> Result<OrderWithItems, OrderError> {
        self.orders
            .get_with_items(id)
            .await?
            .filter(|o| viewer.owns_or_admin(o.order.user_id))
            .ok_or(OrderError::NotFound)
    }

    /// All orders, for admins.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<OrderWithItems>, i64), OrderError> {
        Ok(self.orders.list_all(status, page).await?)
    }

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidTransition` if the change isn't allowed.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, OrderError> {
        match self.orders.update_status(id, status).await {
            Ok(StatusChange::Updated(order)) => {
                info!(order_id = %id, status = %status, "Order status changed");
                Ok(order)
            }
            Ok(StatusChange::Rejected { current }) => Err(OrderError::InvalidTransition {
                from: current,
                to: status,
            }),
            Err(RepositoryError::NotFound) => Err(OrderError::NotFound),
            Err(other) => Err(other.into()),
        }
    }

    /// Mark an order as paid.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order isn't visible to the caller.
    /// Returns `OrderError::PayCancelled` for cancelled orders.
    #[instrument(skip(self), fields(user_id = %viewer.id))]
    pub async fn pay(&self, viewer: CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .orders
            .get(id)
            .await?
            .filter(|o| viewer.owns_or_admin(o.user_id))
            .ok_or(OrderError::NotFound)?;

        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::PayCancelled);
        }

        let order = self.orders.mark_paid(id).await.map_err(|e| match e {
            RepositoryError::NotFound => OrderError::NotFound,
            other => other.into(),
        })?;
        info!(order_id = %id, "Order paid");
        Ok(order)
    }
}

/// Check an order request before touching the database.
fn validate_order(
    customer: CurrentUser,
    lines: Vec<OrderLine>,
    shipping_address: &str,
    payment_method: PaymentMethod,
) -> Result<NewOrder, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }
    if lines.iter().any(|line| line.quantity == 0) {
        return Err(OrderError::InvalidQuantity);
    }
    let shipping_address = shipping_address.trim();
    if shipping_address.is_empty() {
        return Err(OrderError::MissingShippingAddress);
    }

    Ok(NewOrder {
        user_id: customer.id,
        lines,
        shipping_address: shipping_address.to_string(),
        payment_method,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::{PaymentStatus, ProductId, UserId, UserRole};

    use super::*;

    fn customer() -> CurrentUser {
        CurrentUser {
            id: UserId::new(5),
            role: UserRole::User,
        }
    }

    fn line(quantity: u32) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(1),
            quantity,
        }
    }

    #[test]
    fn test_empty_order_rejected() {
        let err = validate_order(customer(), vec![], "1 Main St", PaymentMethod::Card).unwrap_err();
        assert!(matches!(err, OrderError::EmptyOrder));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let err = validate_order(customer(), vec![line(2), line(0)], "1 Main St", PaymentMethod::Card)
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidQuantity));
    }

    #[test]
    fn test_blank_address_rejected() {
        let err = validate_order(customer(), vec![line(1)], "   ", PaymentMethod::Card).unwrap_err();
        assert!(matches!(err, OrderError::MissingShippingAddress));
    }

    #[test]
    fn test_valid_order() {
        let order = validate_order(
            customer(),
            vec![line(2)],
            "  1 Main St ",
            PaymentMethod::CashOnDelivery,
        )
        .unwrap();
        assert_eq!(order.user_id, UserId::new(5));
        assert_eq!(order.shipping_address, "1 Main St");
        assert_eq!(order.initial_payment_status(), PaymentStatus::Pending);
    }
}
