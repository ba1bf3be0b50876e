//! Self-recovery: quick resume and self-recovery review (spec.md §4.10, C10).
//!
//! Grounded in `examples/original_source/src/mcp_handlers/self_recovery.py`: a
//! single-agent alternative to the dialectic protocol, for when no reviewer is
//! available or the deliberation is unnecessary for a mildly-off state.

use chrono::{DateTime, Utc};

use unitares_core::eisv::AgentState;
use unitares_core::IdentityStatus;
use unitares_knowledge::graph::{store_discovery, NewDiscovery};
use unitares_store::{DiscoveryKind, Severity, UnitaresStore};

use crate::error::{DialecticError, DialecticResult};

const QUICK_RESUME_MIN_COHERENCE: f64 = 0.60;
const QUICK_RESUME_MAX_RISK: f64 = 0.40;

const REVIEW_MIN_REFLECTION_LEN: usize = 20;
const REVIEW_MAX_RISK: f64 = 0.70;
const REVIEW_MIN_COHERENCE: f64 = 0.30;

const FORBIDDEN_TERMS: &[&str] =
    &["disable governance", "bypass safety", "remove monitoring", "ignore limits", "skip checks"];
const VAGUE_TERMS: &[&str] = &["everything", "anything", "always", "never check", "trust me"];

/// Allowed only when coherence/risk/void are all comfortably in-band and the
/// identity is in a resumable status (spec.md §4.10 "Quick resume").
pub fn quick_resume(store: &UnitaresStore, agent_id: &str, state: &AgentState, now: DateTime<Utc>) -> DialecticResult<()> {
    let identity = store
        .get_identity_by_agent_id(agent_id)?
        .ok_or_else(|| DialecticError::IdentityNotFound(agent_id.to_string()))?;

    if !matches!(
        identity.status,
        IdentityStatus::Paused | IdentityStatus::WaitingInput | IdentityStatus::Moderate | IdentityStatus::Active
    ) {
        return Err(DialecticError::WrongPhase {
            expected: "paused|waiting_input|moderate|active".to_string(),
            actual: identity.status.to_string(),
        });
    }
    if state.coherence < QUICK_RESUME_MIN_COHERENCE || state.risk_score > QUICK_RESUME_MAX_RISK || state.void_active {
        return Err(DialecticError::Escalate {
            reason: format!(
                "not safe enough for quick_resume: coherence={:.2} risk={:.2} void_active={}",
                state.coherence, state.risk_score, state.void_active
            ),
        });
    }

    resume_identity(store, agent_id, now, "quick_resumed")?;
    store_discovery(
        store,
        NewDiscovery {
            agent_id: agent_id.to_string(),
            kind: DiscoveryKind::Note,
            severity: Severity::Low,
            summary: "quick resume".to_string(),
            details: format!(
                "quick_resume: coherence={:.2} risk={:.2} void_active={}",
                state.coherence, state.risk_score, state.void_active
            ),
            tags: vec!["self_recovery".to_string(), "quick_resume".to_string()],
            confidence: None,
            references_files: Vec::new(),
            provenance: None,
        },
        now,
    )?;
    Ok(())
}

/// Validates conditions against the forbidden/vague term lists (spec.md
/// §4.10 "rejection is a hard error").
fn validate_conditions(conditions: &[String]) -> DialecticResult<()> {
    for condition in conditions {
        let lower = condition.to_lowercase();
        for forbidden in FORBIDDEN_TERMS {
            if lower.contains(forbidden) {
                return Err(DialecticError::UnsafeCondition(format!(
                    "condition '{condition}' contains forbidden term '{forbidden}'"
                )));
            }
        }
        for vague in VAGUE_TERMS {
            if lower.contains(vague) {
                return Err(DialecticError::UnsafeCondition(format!(
                    "condition '{condition}' is too vague (contains '{vague}')"
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RecoveryAssessment {
    pub safe: bool,
    pub escalate: bool,
    pub reason: String,
    pub warnings: Vec<String>,
}

/// Assesses whether a reflection-backed recovery is safe, per the three hard
/// escalation gates and softer warning bands (spec.md §4.10 "Safety gate").
fn assess_recovery_safety(state: &AgentState, reflection: &str) -> RecoveryAssessment {
    if state.void_active {
        return RecoveryAssessment {
            safe: false,
            escalate: true,
            reason: "void is active - accumulated E-I imbalance requires review".to_string(),
            warnings: vec![],
        };
    }
    if state.risk_score > REVIEW_MAX_RISK {
        return RecoveryAssessment {
            safe: false,
            escalate: true,
            reason: format!("risk score ({:.2}) exceeds self-recovery limit ({REVIEW_MAX_RISK})", state.risk_score),
            warnings: vec![],
        };
    }
    if state.coherence < REVIEW_MIN_COHERENCE {
        return RecoveryAssessment {
            safe: false,
            escalate: true,
            reason: format!("coherence ({:.2}) below self-recovery threshold ({REVIEW_MIN_COHERENCE})", state.coherence),
            warnings: vec![],
        };
    }
    if reflection.trim().len() < REVIEW_MIN_REFLECTION_LEN {
        return RecoveryAssessment {
            safe: false,
            escalate: false,
            reason: "reflection too brief - genuine reflection requires more thought".to_string(),
            warnings: vec![],
        };
    }

    let mut warnings = Vec::new();
    if state.risk_score > 0.50 {
        warnings.push(format!("risk score ({:.2}) is elevated - proceed carefully", state.risk_score));
    }
    if state.coherence < 0.50 {
        warnings.push(format!("coherence ({:.2}) is below optimal - consider simpler tasks", state.coherence));
    }
    if state.v.abs() > 0.5 {
        warnings.push(format!("void value ({:.2}) shows some E-I imbalance", state.v));
    }

    RecoveryAssessment { safe: true, escalate: false, reason: "metrics within self-recovery limits".to_string(), warnings }
}

/// Full self-recovery review path (spec.md §4.10 "Self-recovery review").
pub fn self_recovery_review(
    store: &UnitaresStore,
    agent_id: &str,
    state: &AgentState,
    reflection: &str,
    conditions: Vec<String>,
    now: DateTime<Utc>,
) -> DialecticResult<RecoveryAssessment> {
    validate_conditions(&conditions)?;

    let assessment = assess_recovery_safety(state, reflection);
    if !assessment.safe {
        if assessment.escalate {
            return Err(DialecticError::Escalate { reason: assessment.reason });
        }
        return Err(DialecticError::ReflectionTooShort { min: REVIEW_MIN_REFLECTION_LEN });
    }

    resume_identity(store, agent_id, now, "self_recovery_reviewed")?;
    store_discovery(
        store,
        NewDiscovery {
            agent_id: agent_id.to_string(),
            kind: DiscoveryKind::Note,
            severity: Severity::Low,
            summary: "self-recovery review".to_string(),
            details: if conditions.is_empty() {
                reflection.to_string()
            } else {
                format!("{reflection}\n\nconditions: {}", conditions.join("; "))
            },
            tags: vec!["self_recovery".to_string(), "recovery_review".to_string()],
            confidence: None,
            references_files: Vec::new(),
            provenance: None,
        },
        now,
    )?;
    Ok(assessment)
}

/// Non-mutating eligibility check, for a handler to report options to the
/// agent before it commits to `quick_resume` or `self_recovery_review`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecoveryEligibility {
    pub quick_resume_eligible: bool,
    pub review_eligible: bool,
    pub review_escalate: bool,
    pub reason: String,
}

pub fn check_recovery_options(state: &AgentState) -> RecoveryEligibility {
    let quick_resume_eligible =
        state.coherence >= QUICK_RESUME_MIN_COHERENCE && state.risk_score <= QUICK_RESUME_MAX_RISK && !state.void_active;

    let assessment = assess_recovery_safety(state, &"x".repeat(REVIEW_MIN_REFLECTION_LEN));
    RecoveryEligibility {
        quick_resume_eligible,
        review_eligible: assessment.safe,
        review_escalate: assessment.escalate,
        reason: assessment.reason,
    }
}

/// Operator override: resumes the agent unconditionally, bypassing the
/// safety gates `quick_resume`/`self_recovery_review` enforce. Authorization
/// that the caller is in fact an operator is the handler's responsibility
/// (spec.md §4.10 "Operator override").
pub fn operator_resume_agent(store: &UnitaresStore, agent_id: &str, operator_note: &str, now: DateTime<Utc>) -> DialecticResult<()> {
    resume_identity(store, agent_id, now, "operator_resumed")?;
    store_discovery(
        store,
        NewDiscovery {
            agent_id: agent_id.to_string(),
            kind: DiscoveryKind::Note,
            severity: Severity::Low,
            summary: "operator resume".to_string(),
            details: operator_note.to_string(),
            tags: vec!["self_recovery".to_string(), "operator_resume".to_string()],
            confidence: None,
            references_files: Vec::new(),
            provenance: None,
        },
        now,
    )?;
    Ok(())
}

fn resume_identity(store: &UnitaresStore, agent_id: &str, now: DateTime<Utc>, lifecycle_event: &str) -> DialecticResult<()> {
    let mut identity = store
        .get_identity_by_agent_id(agent_id)?
        .ok_or_else(|| DialecticError::IdentityNotFound(agent_id.to_string()))?;
    identity.status = IdentityStatus::Active;
    identity.paused_at = None;
    store.upsert_identity(&identity)?;
    store.append_audit_event(agent_id, "lifecycle", serde_json::json!({"event": lifecycle_event}), now)?;
    tracing::info!(agent_id, lifecycle_event, "identity recovered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitares_store::IdentityRecord;
    use uuid::Uuid;

    fn store_with_paused_identity(agent_id: &str, now: DateTime<Utc>) -> UnitaresStore {
        let store = UnitaresStore::open_temporary().unwrap();
        store
            .upsert_identity(&IdentityRecord {
                agent_uuid: Uuid::new_v4(),
                agent_id: agent_id.to_string(),
                status: IdentityStatus::Paused,
                created_at: now,
                last_seen_at: now,
                paused_at: Some(now),
            })
            .unwrap();
        store
    }

    fn healthy_state() -> AgentState {
        let mut state = AgentState::new(50);
        state.coherence = 0.8;
        state.risk_score = 0.1;
        state.void_active = false;
        state
    }

    #[test]
    fn quick_resume_succeeds_when_metrics_are_safe() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        quick_resume(&store, "agent-1", &healthy_state(), now).unwrap();
        let identity = store.get_identity_by_agent_id("agent-1").unwrap().unwrap();
        assert_eq!(identity.status, IdentityStatus::Active);
    }

    #[test]
    fn quick_resume_rejects_high_risk() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let mut state = healthy_state();
        state.risk_score = 0.8;
        let result = quick_resume(&store, "agent-1", &state, now);
        assert!(matches!(result, Err(DialecticError::Escalate { .. })));
    }

    #[test]
    fn recovery_review_requires_reflection_length() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let result = self_recovery_review(&store, "agent-1", &healthy_state(), "too short", vec![], now);
        assert!(matches!(result, Err(DialecticError::ReflectionTooShort { .. })));
    }

    #[test]
    fn recovery_review_rejects_forbidden_terms() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let result = self_recovery_review(
            &store,
            "agent-1",
            &healthy_state(),
            "I got stuck in a loop and will take a different approach next time.",
            vec!["disable governance checks".to_string()],
            now,
        );
        assert!(matches!(result, Err(DialecticError::UnsafeCondition(_))));
    }

    #[test]
    fn recovery_review_rejects_vague_terms() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let result = self_recovery_review(
            &store,
            "agent-1",
            &healthy_state(),
            "I got stuck in a loop and will take a different approach next time.",
            vec!["just trust me on this one".to_string()],
            now,
        );
        assert!(matches!(result, Err(DialecticError::UnsafeCondition(_))));
    }

    #[test]
    fn recovery_review_escalates_on_void_active() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let mut state = healthy_state();
        state.void_active = true;
        let result = self_recovery_review(
            &store,
            "agent-1",
            &state,
            "I got stuck in a loop and will take a different approach next time.",
            vec![],
            now,
        );
        assert!(matches!(result, Err(DialecticError::Escalate { .. })));
    }

    #[test]
    fn recovery_review_passes_with_warnings_on_soft_band() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let mut state = healthy_state();
        state.risk_score = 0.55;
        let assessment = self_recovery_review(
            &store,
            "agent-1",
            &state,
            "I got stuck in a loop and will take a different approach next time.",
            vec!["Time-box debugging to 15 minutes".to_string()],
            now,
        )
        .unwrap();
        assert!(assessment.safe);
        assert!(!assessment.warnings.is_empty());
    }

    #[test]
    fn check_recovery_options_reports_eligibility_without_mutating() {
        let mut state = healthy_state();
        state.risk_score = 0.5;
        let options = check_recovery_options(&state);
        assert!(!options.quick_resume_eligible);
        assert!(options.review_eligible);
    }

    #[test]
    fn operator_resume_bypasses_safety_gates() {
        let now = Utc::now();
        let store = store_with_paused_identity("agent-1", now);
        let mut state = healthy_state();
        state.void_active = true;
        assert!(quick_resume(&store, "agent-1", &state, now).is_err());

        operator_resume_agent(&store, "agent-1", "operator override: manual review complete", now).unwrap();
        let identity = store.get_identity_by_agent_id("agent-1").unwrap().unwrap();
        assert_eq!(identity.status, IdentityStatus::Active);
    }
}
