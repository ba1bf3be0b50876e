use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DialecticError {
    #[error("dialectic session {0} not found")]
    SessionNotFound(Uuid),

    #[error("agent {0} already has an active dialectic session")]
    AlreadyActive(String),

    #[error("identity {0} not found")]
    IdentityNotFound(String),

    #[error("discovery {0} not found")]
    DiscoveryNotFound(Uuid),

    #[error("wrong phase: expected {expected}, session is in {actual}")]
    WrongPhase { expected: String, actual: String },

    #[error("caller {caller} is not authorized to act on session {session_id} as {role}")]
    NotAuthorized { session_id: Uuid, caller: String, role: String },

    #[error("identity {0} is not paused")]
    NotPaused(String),

    #[error("reflection too short: must be at least {min} characters")]
    ReflectionTooShort { min: usize },

    #[error("recovery condition rejected: {0}")]
    UnsafeCondition(String),

    #[error("recovery blocked: {reason}")]
    Escalate { reason: String },

    #[error(transparent)]
    Knowledge(#[from] unitares_knowledge::KnowledgeError),

    #[error(transparent)]
    Store(#[from] unitares_store::StoreError),
}

pub type DialecticResult<T> = Result<T, DialecticError>;
