//! Marketplace Core - Shared domain types.
//!
//! This crate provides the types used across all marketplace components:
//! - `api` - The REST API server
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, ratings, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
