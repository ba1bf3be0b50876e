//! Governance core: EISV dynamics, dual-log continuity, ethical drift, and calibration
//! (spec.md modules C4–C7). Satellite crates (`unitares-store`, `unitares-identity`,
//! `unitares-knowledge`, `unitares-dialectic`, `unitares-telemetry`, `unitares-dispatch`)
//! depend on the types here rather than duplicating them.

pub mod calibration;
pub mod config;
pub mod continuity;
pub mod drift;
pub mod eisv;
pub mod error;
pub mod types;

pub use calibration::{
    BinStats, CalibrationTracker, DriftClassification, MiscalibrationReport, OutcomeEvidence, OutcomeKind,
    PendingPrediction,
};
pub use config::GovernanceConfig;
pub use continuity::{
    ContinuityLog, ContinuityMetrics, OperationalEntry, ReflectiveEntry, RestorativeAssessment, RestorativeMonitor,
};
pub use drift::{compute_ethical_drift, AgentBaseline, DriftInputs, EthicalDriftVector};
pub use eisv::{compute_margin, simulate, step, AgentState, StepInputs, StepOutcome};
pub use error::{CoreError, CoreResult};
pub use types::{clip, BoundedHistory, ConditionAction, Decision, HealthStatus, IdentityStatus, ParsedCondition, Regime};
