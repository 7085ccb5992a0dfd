use twk_types::Address;

/// Errors from value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The value (or its containing key) does not exist.
    #[error("value not found: {0}")]
    NotFound(Address),

    /// The caller lacks permission, e.g. the key is protected by policy or
    /// requires elevation.
    #[error("access denied: {0}")]
    AccessDenied(Address),

    /// Any other backend failure.
    #[error("store operation on {address} failed: {reason}")]
    Other { address: Address, reason: String },

    /// I/O error from a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure of a file-backed store.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
