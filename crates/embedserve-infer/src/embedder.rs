//! Embedding engine trait.
//!
//! The `EmbedderBackend` trait abstracts over embedding generation so the
//! HTTP layer never depends on a concrete runtime. `OnnxEmbedder` is the
//! production implementation (requires the `onnx` feature).

use embedserve_core::{ComputeDevice, Error, Result};
use ndarray::Array2;

/// Upper bound on the number of texts sent through the model in one run.
pub const MAX_BATCH_SIZE: usize = 32;

/// Batch size used for a call with `count` inputs.
pub fn batch_size(count: usize) -> usize {
    count.clamp(1, MAX_BATCH_SIZE)
}

/// Split `texts` into batches of at most `MAX_BATCH_SIZE`, run each through
/// `run_batch`, and concatenate the rows in input order.
///
/// Every batch must come back as `batch.len() x dimension`; anything else is
/// an inference error.
pub fn encode_in_batches<F>(
    texts: &[String],
    dimension: usize,
    mut run_batch: F,
) -> Result<Vec<Vec<f32>>>
where
    F: FnMut(&[&str]) -> Result<Array2<f32>>,
{
    let mut embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size(texts.len())) {
        let batch: Vec<&str> = chunk.iter().map(String::as_str).collect();
        let rows = run_batch(&batch)?;

        if rows.nrows() != batch.len() || rows.ncols() != dimension {
            return Err(Error::Inference(format!(
                "Model returned {}x{} for a batch of {} (expected dim {})",
                rows.nrows(),
                rows.ncols(),
                batch.len(),
                dimension
            )));
        }
        embeddings.extend(rows.outer_iter().map(|row| row.to_vec()));
    }

    Ok(embeddings)
}

/// Trait for embedding backends.
///
/// Implementations are shared read-only across all requests, so `encode`
/// takes `&self` and must be safe to call concurrently.
pub trait EmbedderBackend: Send + Sync {
    /// Encode `texts` into unit-length vectors, one per input, in input order.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Number of components in every vector returned by `encode`.
    fn dimension(&self) -> usize;

    /// Identifier the model was loaded from.
    fn model_id(&self) -> &str;

    /// Device the model runs on.
    fn device(&self) -> ComputeDevice;
}
