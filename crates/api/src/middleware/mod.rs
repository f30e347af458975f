//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. CORS
//! 3. `TraceLayer` (request tracing)
//! 4. Request ID (add unique ID to each request)
//! 5. Body size limit
//! 6. Rate limiting (governor) on auth and contact routes

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{OptionalAuth, RequireAdmin, RequireAuth};
pub use rate_limit::{auth_rate_limiter, contact_rate_limiter};
pub use request_id::request_id_middleware;
