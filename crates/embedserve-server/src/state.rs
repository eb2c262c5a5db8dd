//! Shared application state.

use std::sync::Arc;

use embedserve_core::ServerConfig;
use embedserve_infer::EmbedderBackend;

/// Shared application state accessible from all route handlers.
///
/// Built once in `main` after the model has loaded; handlers only ever see it
/// behind an `Arc`, so the embedder cannot be replaced or reloaded.
pub struct AppState {
    pub config: ServerConfig,
    pub embedder: Arc<dyn EmbedderBackend>,
}

impl AppState {
    pub fn new(config: ServerConfig, embedder: Arc<dyn EmbedderBackend>) -> Self {
        Self { config, embedder }
    }
}
