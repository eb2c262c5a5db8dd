//! Embedserve Core — configuration, compute device, error types.

pub mod config;
pub mod device;
pub mod error;

pub use config::ServerConfig;
pub use device::{ComputeDevice, DevicePreference};
pub use error::{Error, Result};
