//! Error types for the identification engine.

use formatid_core::ResourceAccessError;
use formatid_signatures::RegistryError;
use thiserror::Error;

/// Failure to set up an engine.
///
/// Identification itself only fails with [`ResourceAccessError`]; these are
/// configuration and signature loading failures.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Signature file could not be loaded.
    #[error("signature registry: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource failure during identification.
    #[error(transparent)]
    Resource(#[from] ResourceAccessError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
