//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketplace_core::{
    OrderId, OrderItemId, OrderStatus, PaymentMethod, PaymentStatus, Price, ProductId, UserId,
};

/// An order header row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub total_price: Price,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of an order. Name and price are snapshots taken at checkout.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub quantity: i32,
}

/// An order together with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// A requested order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A validated order request ready to be placed.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

impl NewOrder {
    /// Payment status the order starts in.
    #[must_use]
    pub const fn initial_payment_status(&self) -> PaymentStatus {
        PaymentStatus::for_method(self.payment_method)
    }
}
