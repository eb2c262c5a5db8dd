//! Process configuration, read once from the environment at startup.

use crate::device::DevicePreference;
use crate::error::{Error, Result};

/// Model loaded when `EMBEDDING_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";

/// Port bound when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8000;

/// Top-level embedserve configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// HTTP server port (all interfaces).
    pub port: u16,
    /// Hugging Face repo id or local model directory.
    pub model_id: String,
    /// Where the model should run.
    pub device: DevicePreference,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            model_id: DEFAULT_MODEL.to_string(),
            device: DevicePreference::Auto,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset. A `PORT` or `EMBEDDING_DEVICE` that is set
    /// but cannot be parsed is an error rather than a silent default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT '{}'", raw)))?,
            None => DEFAULT_PORT,
        };

        let model_id = get("EMBEDDING_MODEL")
            .map(|m| m.trim().to_string())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let device = match get("EMBEDDING_DEVICE") {
            Some(raw) => raw.parse()?,
            None => DevicePreference::Auto,
        };

        Ok(Self {
            port,
            model_id,
            device,
        })
    }
}
