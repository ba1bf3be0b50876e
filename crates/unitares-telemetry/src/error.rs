use unitares_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("backfill source not found: {0}")]
    SourceNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
