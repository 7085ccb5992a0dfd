use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown root namespace tag: {0}")]
    UnknownRoot(String),

    #[error("unknown value kind tag: {0}")]
    UnknownKind(u32),
}
