//! Liveness and model info.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// GET /health — only reachable once the model is resident.
async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let embedder = &state.embedder;
    Json(serde_json::json!({
        "status": "ok",
        "model": embedder.model_id(),
        "device": embedder.device(),
        "dimension": embedder.dimension(),
        "port": state.config.port,
    }))
}
