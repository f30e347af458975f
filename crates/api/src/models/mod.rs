//! Domain models for the marketplace API.
//!
//! Most models derive `sqlx::FromRow` and `Serialize` directly: they are both
//! the row shape returned by the repositories and the JSON sent to clients.
//! Input types (`New*`, `*Changes`) carry already-validated values.

pub mod catalog;
pub mod chat;
pub mod contact;
pub mod order;
pub mod push;
pub mod review;
pub mod user;

pub use catalog::{
    Category, CategoryInput, NewProduct, Product, ProductChanges, ProductFilter, ProductSort,
    Supplier, SupplierInput,
};
pub use chat::{ChatEvent, Conversation, Message};
pub use contact::{ContactMessage, NewContactMessage};
pub use order::{NewOrder, Order, OrderItem, OrderLine, OrderWithItems};
pub use push::{NewPushSubscription, PushNotification, PushSubscription};
pub use review::Review;
pub use user::{CurrentUser, ProfileChanges, User};
