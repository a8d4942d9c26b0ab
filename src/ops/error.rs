//! Domain-specific errors for package operations

use thiserror::Error;

use crate::core::manifest::ManifestError;
use crate::io::download::DownloadError;
use crate::store::StateError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("install step '{step}' failed: {cause}")]
    Step { step: String, cause: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl InstallError {
    /// Wrap a failure with the identity of the step it happened in.
    pub fn step(step: &str, cause: impl std::fmt::Display) -> Self {
        Self::Step {
            step: step.to_string(),
            cause: cause.to_string(),
        }
    }
}
