//! HTTP route handlers.

pub mod embed;
pub mod health;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Error half of every handler result: a status plus `{"detail": ...}`.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

/// Build an `ApiError` carrying a human-readable detail message.
pub fn detail(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "detail": message.into() })),
    )
}

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(embed::routes())
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
