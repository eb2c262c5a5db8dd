//! Compute device selection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Device the embedding model is bound to for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// CUDA-capable GPU.
    #[serde(rename = "cuda")]
    Accelerator,
    /// General-purpose processor.
    Cpu,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accelerator => write!(f, "cuda"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Operator preference for device selection (`EMBEDDING_DEVICE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Use the accelerator when one is available, otherwise the CPU.
    #[default]
    Auto,
    /// Require the accelerator; startup fails without one.
    Accelerator,
    /// Never touch the accelerator.
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cuda" | "gpu" | "accelerator" => Ok(Self::Accelerator),
            "cpu" => Ok(Self::Cpu),
            other => Err(Error::Config(format!(
                "unknown EMBEDDING_DEVICE '{}' (expected auto, cuda or cpu)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Accelerator => write!(f, "cuda"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Cheap check for an NVIDIA device node.
///
/// This only says a driver is present. The inference runtime still has to
/// confirm it can actually use the device.
pub fn accelerator_present() -> bool {
    #[cfg(target_os = "linux")]
    {
        use std::fs;
        fs::metadata("/dev/nvidia0").is_ok()
            || fs::metadata("/dev/nvhost-gpu").is_ok() // Jetson
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("CUDA_PATH").is_some()
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        false
    }
}
