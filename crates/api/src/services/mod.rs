//! Business logic services.
//!
//! # Services
//!
//! - `accounts` - Cached account roles for token holders
//! - `auth` - Password accounts and access tokens
//! - `catalog` - Cached category listing
//! - `chat` - Conversations and the in-process broadcast hub
//! - `orders` - Checkout and order lifecycle
//! - `push` - Web Push delivery
//! - `reviews` - Product reviews
//! - `uploads` - Image uploads from multipart forms

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod orders;
pub mod push;
pub mod reviews;
pub mod uploads;
