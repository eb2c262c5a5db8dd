//! POST /embed — batch text embedding.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{detail, ApiError};
use crate::state::AppState;

/// Detail returned for a well-formed request with no texts.
pub const EMPTY_TEXTS_DETAIL: &str = "'texts' list must not be empty";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
}

/// One unit-length vector per input text, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/embed", post(embed))
}

async fn embed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        debug!("Rejected /embed body: {}", rejection.body_text());
        detail(rejection.status(), rejection.body_text())
    })?;

    if req.texts.is_empty() {
        return Err(detail(StatusCode::BAD_REQUEST, EMPTY_TEXTS_DETAIL));
    }

    let count = req.texts.len();
    let embedder = state.embedder.clone();

    // Inference is compute-bound; keep it off the async workers.
    let embeddings = tokio::task::spawn_blocking(move || embedder.encode(&req.texts))
        .await
        .map_err(|e| {
            error!("Embedding task failed to complete: {}", e);
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Embedding task failed")
        })?
        .map_err(|e| {
            error!("Embedding {} texts failed: {}", count, e);
            detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    debug!("Embedded {} texts", count);
    Ok(Json(EmbedResponse { embeddings }))
}
