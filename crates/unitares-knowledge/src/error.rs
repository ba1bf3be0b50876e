use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("discovery {0} not found")]
    NotFound(Uuid),

    #[error("agent {owner} cannot mutate discovery owned by {actual}")]
    NotOwner { owner: String, actual: String },

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("superseded discoveries require a pointer to the replacement")]
    MissingSupersededBy,

    #[error(transparent)]
    Store(#[from] unitares_store::StoreError),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
