//! Sentence pooling and L2 normalization over model outputs.

use std::path::Path;

use embedserve_core::{Error, Result};
use ndarray::{s, Array2, ArrayView2, ArrayView3};
use serde::Deserialize;

/// How token embeddings are reduced to one vector per text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolingStrategy {
    /// Attention-weighted mean over all tokens.
    #[default]
    Mean,
    /// First token (`[CLS]`) only.
    Cls,
}

/// Subset of a sentence-transformers `1_Pooling/config.json`.
#[derive(Debug, Default, Deserialize)]
struct PoolingConfig {
    #[serde(default)]
    pooling_mode_cls_token: bool,
    #[serde(default)]
    pooling_mode_mean_tokens: bool,
}

impl PoolingStrategy {
    /// Read the strategy from a sentence-transformers pooling config.
    ///
    /// Mean pooling wins when both modes are enabled; neither enabled falls
    /// back to mean as well.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_config_str(&raw)
    }

    pub fn from_config_str(raw: &str) -> Result<Self> {
        let config: PoolingConfig = serde_json::from_str(raw)
            .map_err(|e| Error::ModelLoad(format!("Invalid pooling config: {}", e)))?;
        Ok(if config.pooling_mode_cls_token && !config.pooling_mode_mean_tokens {
            Self::Cls
        } else {
            Self::Mean
        })
    }

    /// Reduce `[batch, seq, dim]` token embeddings to `[batch, dim]`.
    pub fn pool(self, tokens: ArrayView3<'_, f32>, mask: ArrayView2<'_, i64>) -> Array2<f32> {
        match self {
            Self::Mean => mean_pool(tokens, mask),
            Self::Cls => tokens.slice(s![.., 0, ..]).to_owned(),
        }
    }
}

/// Mean-pool token embeddings `[batch, seq, dim]` into `[batch, dim]`.
///
/// Each token is weighted by its attention mask entry, so padding positions
/// contribute nothing. A row whose mask is all zeros pools to zeros.
pub fn mean_pool(tokens: ArrayView3<'_, f32>, mask: ArrayView2<'_, i64>) -> Array2<f32> {
    let (batch, seq, dim) = tokens.dim();
    debug_assert_eq!(mask.dim(), (batch, seq));

    let mut pooled = Array2::<f32>::zeros((batch, dim));
    for ((mut out, row_tokens), row_mask) in pooled
        .outer_iter_mut()
        .zip(tokens.outer_iter())
        .zip(mask.outer_iter())
    {
        let mut weight = 0.0f32;
        for (token, &m) in row_tokens.outer_iter().zip(row_mask.iter()) {
            if m > 0 {
                out.scaled_add(m as f32, &token);
                weight += m as f32;
            }
        }
        if weight > 0.0 {
            out /= weight;
        }
    }
    pooled
}

/// Scale every row to unit Euclidean norm in place.
pub fn l2_normalize_rows(rows: &mut Array2<f32>) {
    for mut row in rows.rows_mut() {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            row /= norm;
        }
    }
}
