//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{routing::get, Router};

use crate::AppState;

mod events;
mod health;
mod history;

pub use health::*;
pub use history::{ClientEnvironment, SCREEN_RESOLUTION_HEADER};

/// Health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
}

/// Create the full API router, to be nested under `/api/v1`
pub fn routes() -> Router<AppState> {
    health_routes().nest("/history", history::routes())
}
