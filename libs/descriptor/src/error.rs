//! Error types for descriptor persistence and parsing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from descriptor and network value handling.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// No descriptor is stored for the sandbox.
    #[error("descriptor not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The sandbox identifier cannot be used as a record key.
    #[error("invalid sandbox id '{0}'")]
    InvalidSandboxId(String),

    /// Invalid CIDR notation.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Could not encode or decode a descriptor record.
    #[error("descriptor encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Filesystem failure while reading or writing a record.
    #[error("descriptor io failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DescriptorError {
    /// Returns true if the record did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DescriptorError::NotFound { .. })
    }
}
