use thiserror::Error;

/// Storage errors surfaced across the persistence layer (spec.md §4.1).
///
/// `Transient` errors are the ones worth retrying at the store boundary (see
/// [`crate::retry::with_backoff`]); everything else is permanent and should
/// propagate straight to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("conflicting identity mappings for {0}")]
    IdentityAmbiguous(String),

    #[error("dialectic session not found: {0}")]
    DialecticSessionNotFound(String),

    #[error("schema version mismatch: store has {found}, expected {expected}")]
    SchemaVersionMismatch { found: u32, expected: u32 },

    #[error("transient backend failure, retry: {0}")]
    Transient(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether the store boundary should retry this error with backoff
    /// (spec.md §4.1 "Failure semantics").
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
