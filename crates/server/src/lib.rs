//! Forkline server library.
//!
//! Persistence, identity verification, services and the JSON HTTP surface
//! around the `forkline-core` engine. The binary in `main.rs` wires these to
//! `PostgreSQL`; tests wire them to [`db::MemoryStore`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request, middleware::from_fn, routing::get};
use tower_http::trace::TraceLayer;

use db::Store;
use state::AppState;

/// Build the application router: `/health` plus every authenticated route,
/// with request tracing and request ids.
pub fn router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes::routes())
        .with_state(state)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                user_id = tracing::field::Empty,
            )
        }))
}

/// Liveness health check. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
