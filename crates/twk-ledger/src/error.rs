use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by ledger persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Checksum missing, unreadable, or not matching the body.
    #[error("ledger integrity check failed: {0}")]
    Integrity(String),

    /// The body passed its checksum but could not be parsed.
    #[error("malformed ledger at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// The header names a format this build does not read.
    #[error("unsupported ledger format: {0:?}")]
    UnsupportedVersion(String),

    /// Writing the temporary file or replacing the real one failed.
    #[error("failed to persist ledger to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Whether this error means the on-disk ledger cannot be trusted.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::Integrity(_) | Self::Malformed { .. } | Self::UnsupportedVersion(_)
        )
    }
}

/// Convenience type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
