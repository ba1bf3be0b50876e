use thiserror::Error;

/// Errors surfaced by the governance core (EISV dynamics, continuity, drift, calibration).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid threshold configuration: {0}")]
    InvalidThresholds(String),

    #[error("value {value} for {field} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("calibration bin not found for confidence {0}")]
    BinNotFound(f64),

    #[error("pending prediction {0} not found")]
    PredictionNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
