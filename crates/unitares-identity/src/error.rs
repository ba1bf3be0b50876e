use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("conflicting identity mappings for {0}")]
    IdentityAmbiguous(String),

    #[error("cache unavailable, degrading to store-only")]
    CacheUnavailable,

    #[error("lock acquisition timed out for agent {agent_uuid}: {recovery_hint}")]
    LockTimeout { agent_uuid: String, recovery_hint: String },

    #[error(transparent)]
    Store(#[from] unitares_store::StoreError),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
