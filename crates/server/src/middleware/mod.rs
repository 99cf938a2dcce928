//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//!
//! Authentication is an extractor rather than a layer, so `/health` stays
//! open while every other route requires a bearer token.

pub mod auth;
pub mod request_id;

pub use auth::{CurrentUser, VerifiedIdentity};
pub use request_id::request_id_middleware;
