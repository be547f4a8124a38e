//! Web server module for the operational endpoints.
//!
//! This module provides:
//! - `/__health`: both dependency checks as a JSON report
//! - `/__gtg`: good-to-go, short-circuiting on the first failed check
//! - `/__ping`: process liveness

pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{good_to_go, health, ping, AppState};

/// Build the router for the operational endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/__health", get(health))
        .route("/__gtg", get(good_to_go))
        .route("/__ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
