pub mod auto_resolve;
pub mod condition;
pub mod error;
pub mod self_recovery;
pub mod session;

pub use auto_resolve::{auto_resolve_default, auto_resolve_stuck_sessions, AutoResolveReport, DEFAULT_STUCK_THRESHOLD_HOURS};
pub use condition::parse_condition;
pub use error::{DialecticError, DialecticResult};
pub use self_recovery::{
    check_recovery_options, operator_resume_agent, quick_resume, self_recovery_review, RecoveryAssessment,
    RecoveryEligibility,
};
pub use session::{
    apply_resolution, request_dialectic_review, submit_antithesis, submit_synthesis, submit_thesis, Phase,
    Resolution, ResolutionAction, SynthesisOutcome,
};
