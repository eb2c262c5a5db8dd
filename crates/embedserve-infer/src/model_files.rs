//! Locating the ONNX graph and tokenizer for a model identifier.
//!
//! An identifier that names an existing directory is used as-is. Anything
//! else is treated as a Hugging Face Hub repository and fetched into the
//! local hub cache (requires the `onnx` feature).

use std::path::{Path, PathBuf};

use embedserve_core::{Error, Result};
use serde::Deserialize;

/// Tokenizer file name shared by local directories and hub repos.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// ONNX graph locations, in lookup order. Sentence-transformers repos ship
/// their export under `onnx/`; hand-exported directories keep it at the root.
pub const MODEL_CANDIDATES: [&str; 2] = ["onnx/model.onnx", "model.onnx"];

/// Optional sentence-transformers pooling description.
pub const POOLING_CONFIG_FILE: &str = "1_Pooling/config.json";

/// Optional sentence-transformers settings, including `max_seq_length`.
pub const SENTENCE_CONFIG_FILE: &str = "sentence_bert_config.json";

/// Token limit used when neither the model nor its tokenizer names one.
pub const DEFAULT_MAX_SEQ_LEN: usize = 512;

#[derive(Debug, Deserialize)]
struct SentenceConfig {
    #[serde(default)]
    max_seq_length: Option<usize>,
}

/// Read `max_seq_length` from `sentence_bert_config.json` contents.
pub fn max_seq_length_from_str(raw: &str) -> Result<Option<usize>> {
    let config: SentenceConfig = serde_json::from_str(raw)
        .map_err(|e| Error::ModelLoad(format!("Invalid sentence config: {}", e)))?;
    Ok(config.max_seq_length.filter(|&len| len > 0))
}

/// Read `max_seq_length` from a `sentence_bert_config.json` file.
pub fn max_seq_length_from_file(path: &Path) -> Result<Option<usize>> {
    let raw = std::fs::read_to_string(path)?;
    max_seq_length_from_str(&raw)
}

/// Token limit for the tokenizer: the model's `max_seq_length` wins over the
/// tokenizer's own truncation, and `DEFAULT_MAX_SEQ_LEN` covers neither.
pub fn truncation_length(sentence_max: Option<usize>, tokenizer_max: Option<usize>) -> usize {
    sentence_max
        .or(tokenizer_max.filter(|&len| len > 0))
        .unwrap_or(DEFAULT_MAX_SEQ_LEN)
}

/// Paths to the files needed to build an embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    /// Absent for plain transformer exports; mean pooling is assumed then.
    pub pooling_config: Option<PathBuf>,
    /// `sentence_bert_config.json`, when the repo ships one.
    pub sentence_config: Option<PathBuf>,
}

impl ModelFiles {
    /// Sequence limit declared by the model's sentence config, if any.
    pub fn max_seq_length(&self) -> Result<Option<usize>> {
        match &self.sentence_config {
            Some(path) => max_seq_length_from_file(path),
            None => Ok(None),
        }
    }
}

impl ModelFiles {
    /// Resolve `model_id` to files on disk, downloading them if needed.
    pub fn resolve(model_id: &str) -> Result<Self> {
        let dir = Path::new(model_id);
        if dir.is_dir() {
            return Self::from_dir(dir);
        }
        Self::from_hub(model_id)
    }

    /// Use the files in a local model directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let tokenizer = dir.join(TOKENIZER_FILE);
        if !tokenizer.is_file() {
            return Err(Error::ModelLoad(format!(
                "Tokenizer not found: {}",
                tokenizer.display()
            )));
        }

        let model = MODEL_CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::ModelLoad(format!(
                    "Model not found in {} (looked for {})",
                    dir.display(),
                    MODEL_CANDIDATES.join(", ")
                ))
            })?;

        let pooling_config = Some(dir.join(POOLING_CONFIG_FILE)).filter(|p| p.is_file());
        let sentence_config = Some(dir.join(SENTENCE_CONFIG_FILE)).filter(|p| p.is_file());

        Ok(Self {
            model,
            tokenizer,
            pooling_config,
            sentence_config,
        })
    }

    #[cfg(feature = "onnx")]
    fn from_hub(repo_id: &str) -> Result<Self> {
        use hf_hub::api::sync::ApiBuilder;
        use tracing::{debug, info};

        info!("Fetching model '{}' from the Hugging Face Hub", repo_id);

        let api = ApiBuilder::from_env()
            .with_progress(false)
            .build()
            .map_err(|e| Error::ModelLoad(format!("Failed to create hub client: {}", e)))?;
        let repo = api.model(repo_id.to_string());

        let tokenizer = repo.get(TOKENIZER_FILE).map_err(|e| {
            Error::ModelLoad(format!("Failed to fetch {} for '{}': {}", TOKENIZER_FILE, repo_id, e))
        })?;

        let pooling_config = repo.get(POOLING_CONFIG_FILE).ok();
        let sentence_config = repo.get(SENTENCE_CONFIG_FILE).ok();

        let mut failures = Vec::new();
        for candidate in MODEL_CANDIDATES {
            match repo.get(candidate) {
                Ok(model) => {
                    debug!("Resolved '{}' to {}", repo_id, model.display());
                    return Ok(Self {
                        model,
                        tokenizer,
                        pooling_config,
                        sentence_config,
                    });
                }
                Err(e) => failures.push(format!("{}: {}", candidate, e)),
            }
        }

        Err(Error::ModelLoad(format!(
            "No ONNX export found for '{}' ({})",
            repo_id,
            failures.join("; ")
        )))
    }

    #[cfg(not(feature = "onnx"))]
    fn from_hub(repo_id: &str) -> Result<Self> {
        Err(Error::ModelLoad(format!(
            "'{}' is not a local directory and hub downloads need the `onnx` feature",
            repo_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_from_dir_root_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(files.model, dir.path().join("model.onnx"));
        assert_eq!(files.tokenizer, dir.path().join("tokenizer.json"));
        assert_eq!(files.pooling_config, None);
        assert_eq!(files.sentence_config, None);
        assert_eq!(files.max_seq_length().unwrap(), None);
    }

    #[test]
    fn test_from_dir_reads_max_seq_length() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();
        fs::write(
            dir.path().join("sentence_bert_config.json"),
            br#"{"max_seq_length": 384, "do_lower_case": false}"#,
        )
        .unwrap();

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(
            files.sentence_config,
            Some(dir.path().join("sentence_bert_config.json"))
        );
        assert_eq!(files.max_seq_length().unwrap(), Some(384));
        assert_eq!(truncation_length(files.max_seq_length().unwrap(), Some(512)), 384);
    }

    #[test]
    fn test_max_seq_length_parsing() {
        assert_eq!(max_seq_length_from_str(r#"{"max_seq_length": 256}"#).unwrap(), Some(256));
        assert_eq!(max_seq_length_from_str(r#"{"do_lower_case": true}"#).unwrap(), None);
        assert_eq!(max_seq_length_from_str(r#"{"max_seq_length": null}"#).unwrap(), None);
        assert_eq!(max_seq_length_from_str(r#"{"max_seq_length": 0}"#).unwrap(), None);
        assert!(max_seq_length_from_str("not json").is_err());
    }

    #[test]
    fn test_truncation_length_precedence() {
        assert_eq!(truncation_length(Some(384), Some(512)), 384);
        assert_eq!(truncation_length(Some(384), None), 384);
        assert_eq!(truncation_length(None, Some(128)), 128);
        assert_eq!(truncation_length(None, Some(0)), DEFAULT_MAX_SEQ_LEN);
        assert_eq!(truncation_length(None, None), 512);
    }

    #[test]
    fn test_from_dir_picks_up_pooling_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("1_Pooling")).unwrap();
        fs::write(dir.path().join("1_Pooling/config.json"), b"{}").unwrap();
        fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(
            files.pooling_config,
            Some(dir.path().join("1_Pooling/config.json"))
        );
    }

    #[test]
    fn test_from_dir_prefers_onnx_subdir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("onnx")).unwrap();
        fs::write(dir.path().join("onnx/model.onnx"), b"graph").unwrap();
        fs::write(dir.path().join("model.onnx"), b"other").unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(files.model, dir.path().join("onnx/model.onnx"));
    }

    #[test]
    fn test_from_dir_missing_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.onnx"), b"graph").unwrap();

        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(err.to_string().contains("Tokenizer not found"));
    }

    #[test]
    fn test_from_dir_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Model not found"));
    }

    #[test]
    fn test_resolve_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let id = dir.path().to_str().unwrap();
        let files = ModelFiles::resolve(id).unwrap();
        assert_eq!(files.model, dir.path().join("model.onnx"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_resolve_hub_id_without_onnx_feature() {
        let err = ModelFiles::resolve("sentence-transformers/all-mpnet-base-v2").unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
