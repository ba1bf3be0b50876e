use unitares_core::CoreError;
use unitares_dialectic::DialecticError;
use unitares_identity::IdentityError;
use unitares_knowledge::KnowledgeError;
use unitares_store::StoreError;

/// Broad bucket a [`DispatchError`] falls into, surfaced to callers as
/// `error_category` so clients can decide whether to retry (spec.md §4.11
/// step 7 "Shape").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    RateLimit,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("field {field} expected {expected}, got {actual}")]
    TypeMismatch { field: String, expected: String, actual: String },
    #[error("field {field} value {value} out of range [{min}, {max}]")]
    OutOfRange { field: String, value: f64, min: f64, max: f64 },
    #[error("field {field} must be one of {allowed:?}, got {actual}")]
    InvalidEnum { field: String, allowed: Vec<String>, actual: String },
    #[error("malformed kwargs payload")]
    MalformedKwargs,
    #[error("rate limit exceeded for tool {tool}")]
    RateLimited { tool: String },
    #[error("loop short-circuit: tool {tool} called {count} times within the window")]
    LoopShortCircuit { tool: String, count: u32 },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error(transparent)]
    Dialectic(#[from] DialecticError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    Handler(String),
}

impl DispatchError {
    /// Stable machine-readable code, independent of the display message.
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::UnknownTool(_) => "UNKNOWN_TOOL",
            DispatchError::MissingField(_) => "MISSING_FIELD",
            DispatchError::TypeMismatch { .. } => "TYPE_MISMATCH",
            DispatchError::OutOfRange { .. } => "OUT_OF_RANGE",
            DispatchError::InvalidEnum { .. } => "INVALID_ENUM",
            DispatchError::MalformedKwargs => "MALFORMED_KWARGS",
            DispatchError::RateLimited { .. } => "RATE_LIMITED",
            DispatchError::LoopShortCircuit { .. } => "LOOP_SHORT_CIRCUIT",
            DispatchError::Identity(_) => "IDENTITY_ERROR",
            DispatchError::Store(_) => "STORE_ERROR",
            DispatchError::Knowledge(_) => "KNOWLEDGE_ERROR",
            DispatchError::Dialectic(_) => "DIALECTIC_ERROR",
            DispatchError::Core(_) => "CORE_ERROR",
            DispatchError::Handler(_) => "HANDLER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DispatchError::UnknownTool(_)
            | DispatchError::MissingField(_)
            | DispatchError::TypeMismatch { .. }
            | DispatchError::OutOfRange { .. }
            | DispatchError::InvalidEnum { .. }
            | DispatchError::MalformedKwargs => ErrorCategory::Validation,
            DispatchError::RateLimited { .. } | DispatchError::LoopShortCircuit { .. } => ErrorCategory::RateLimit,
            DispatchError::Identity(IdentityError::IdentityAmbiguous(_)) => ErrorCategory::Conflict,
            DispatchError::Identity(IdentityError::LockTimeout { .. }) => ErrorCategory::Unavailable,
            DispatchError::Identity(IdentityError::CacheUnavailable) => ErrorCategory::Unavailable,
            DispatchError::Identity(_) => ErrorCategory::Internal,
            DispatchError::Store(_) => ErrorCategory::Unavailable,
            DispatchError::Knowledge(KnowledgeError::NotFound(_)) => ErrorCategory::NotFound,
            DispatchError::Knowledge(_) => ErrorCategory::Validation,
            DispatchError::Dialectic(DialecticError::Escalate { .. }) => ErrorCategory::Conflict,
            DispatchError::Dialectic(_) => ErrorCategory::Validation,
            DispatchError::Core(CoreError::PredictionNotFound(_)) => ErrorCategory::NotFound,
            DispatchError::Core(_) => ErrorCategory::Internal,
            DispatchError::Handler(_) => ErrorCategory::Internal,
        }
    }

    /// Short suggestion for what the caller can do, when one applies.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            DispatchError::RateLimited { .. } => Some("retry after a short backoff"),
            DispatchError::LoopShortCircuit { .. } => Some("pause this tool before retrying"),
            DispatchError::Identity(IdentityError::LockTimeout { .. }) => Some("retry; the agent lock is held elsewhere"),
            DispatchError::Store(_) => Some("retry; the persistence backend may be momentarily unavailable"),
            _ => None,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
