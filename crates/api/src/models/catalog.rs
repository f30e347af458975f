//! Catalog domain types: categories, suppliers, and products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketplace_core::{CategoryId, Email, Price, ProductId, SupplierId, UserId};

/// A product category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated category fields for create and update.
#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
    /// New image path; `None` keeps the current image on update.
    pub image: Option<String>,
}

/// A vendor that owns products and can be messaged.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    /// Login account that answers chats for this supplier.
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated supplier fields for create and update.
#[derive(Debug, Clone)]
pub struct SupplierInput {
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub user_id: Option<UserId>,
}

/// A product with its category and supplier names resolved.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub image: String,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,
    pub supplier_id: Option<SupplierId>,
    pub supplier_name: Option<String>,
    /// Average review rating, 0 when unreviewed.
    pub rating: Decimal,
    pub num_reviews: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether at least `quantity` units are available.
    #[must_use]
    pub fn has_stock(&self, quantity: u32) -> bool {
        u32::try_from(self.stock).is_ok_and(|stock| stock >= quantity)
    }
}

/// Fields for a new product. The image is mandatory.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub image: String,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
}

/// Partial product update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<i32>,
    pub image: Option<String>,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
}

impl ProductChanges {
    /// Whether the update would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.image.is_none()
            && self.category_id.is_none()
            && self.supplier_id.is_none()
    }
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
}

impl ProductSort {
    /// `ORDER BY` clause for this sort. Values are fixed strings, never user input.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::PriceAsc => "p.price ASC, p.id ASC",
            Self::PriceDesc => "p.price DESC, p.id DESC",
            Self::Rating => "p.rating DESC, p.num_reviews DESC, p.id DESC",
        }
    }
}

/// Product listing filters.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive match against name and description.
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub sort: ProductSort,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product_with_stock(stock: i32) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Mug".to_string(),
            description: String::new(),
            price: Price::parse("8.50").unwrap(),
            stock,
            image: "/uploads/mug.png".to_string(),
            category_id: None,
            category_name: None,
            supplier_id: None,
            supplier_name: None,
            rating: Decimal::ZERO,
            num_reviews: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_has_stock() {
        assert!(product_with_stock(3).has_stock(3));
        assert!(!product_with_stock(2).has_stock(3));
        assert!(!product_with_stock(-1).has_stock(0));
    }

    #[test]
    fn test_product_changes_is_empty() {
        assert!(ProductChanges::default().is_empty());
        let changes = ProductChanges {
            stock: Some(4),
            ..ProductChanges::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_sort_deserializes_from_query_value() {
        let sort: ProductSort = serde_json::from_str("\"price_desc\"").unwrap();
        assert_eq!(sort, ProductSort::PriceDesc);
        assert!(sort.order_by().starts_with("p.price DESC"));
    }
}
