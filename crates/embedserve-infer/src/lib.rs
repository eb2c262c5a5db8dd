//! Embedserve Infer — the process-wide embedding model.
//!
//! Provides the `EmbedderBackend` trait. When the `onnx` feature is enabled,
//! `OnnxEmbedder` loads a sentence-transformers ONNX export from a local
//! directory or the Hugging Face Hub and serves pooled, unit-length vectors.

pub mod embedder;
pub mod model_files;
pub mod onnx_embedder;
pub mod pooling;

pub use embedder::{batch_size, encode_in_batches, EmbedderBackend, MAX_BATCH_SIZE};
pub use model_files::{truncation_length, ModelFiles};
pub use pooling::PoolingStrategy;

#[cfg(feature = "onnx")]
pub use onnx_embedder::OnnxEmbedder;

use std::sync::Arc;

use embedserve_core::{Result, ServerConfig};

/// Load the embedder named by `config`.
///
/// There is no fallback: any failure is returned so the caller can refuse to
/// start.
pub fn load_embedder(config: &ServerConfig) -> Result<Arc<dyn EmbedderBackend>> {
    #[cfg(feature = "onnx")]
    {
        let embedder = OnnxEmbedder::load(&config.model_id, config.device)?;
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(embedserve_core::Error::ModelLoad(format!(
            "cannot load '{}': built without the `onnx` feature",
            config.model_id
        )))
    }
}
