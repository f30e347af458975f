//! Marketplace API library.
//!
//! JSON REST API for a multi-vendor marketplace: catalog, orders, reviews,
//! supplier chat, contact messages, and Web Push notifications. The binary
//! in `main.rs` only wires configuration, logging, and the listener; the
//! router itself is built by [`routes::app`] so tests can drive it directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
