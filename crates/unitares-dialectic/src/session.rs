//! Dialectic session state machine (spec.md §4.9, C9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unitares_store::{
    DialecticMessageRecord, DialecticSessionRecord, DiscoveryStatus, IdentityRecord, UnitaresStore,
};

use crate::condition::parse_condition;
use crate::error::{DialecticError, DialecticResult};

const DEFAULT_MAX_SYNTHESIS_ROUNDS: u32 = 3;
/// How recently a reviewer may have reviewed the same paused agent before
/// being excluded from the pool again (spec.md §4.9 "recency window").
const REVIEWER_RECENCY_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingThesis,
    Thesis,
    Antithesis,
    Synthesis,
    Resolved,
    Failed,
    Canceled,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::AwaitingThesis => "awaiting_thesis",
            Phase::Thesis => "thesis",
            Phase::Antithesis => "antithesis",
            Phase::Synthesis => "synthesis",
            Phase::Resolved => "resolved",
            Phase::Failed => "failed",
            Phase::Canceled => "canceled",
        }
    }

    fn parse(s: &str) -> Phase {
        match s {
            "thesis" => Phase::Thesis,
            "antithesis" => Phase::Antithesis,
            "synthesis" => Phase::Synthesis,
            "resolved" => Phase::Resolved,
            "failed" => Phase::Failed,
            "canceled" => Phase::Canceled,
            _ => Phase::AwaitingThesis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    Resume,
    Block,
}

/// Terminal outcome of a dialectic session (spec.md §3 `Resolution(action,
/// conditions[], root_cause, hash)`). `hash` is a deterministic content hash
/// over the resolution's fields, used to dedupe and to stamp the lifecycle
/// event applied to the resumed/blocked identity.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub action: ResolutionAction,
    pub conditions: Vec<String>,
    pub root_cause: String,
    pub hash: String,
}

impl Resolution {
    pub fn new(action: ResolutionAction, conditions: Vec<String>, root_cause: String) -> Self {
        let hash = Self::compute_hash(action, &conditions, &root_cause);
        Self { action, conditions, root_cause, hash }
    }

    fn compute_hash(action: ResolutionAction, conditions: &[String], root_cause: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(match action {
            ResolutionAction::Resume => b"resume" as &[u8],
            ResolutionAction::Block => b"block" as &[u8],
        });
        hasher.update(root_cause.as_bytes());
        for condition in conditions {
            hasher.update(condition.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Opens a new session. Preconditions: `paused_agent_id` has no other active
/// session, and any referenced `discovery_id` exists (spec.md §4.9 "Creation").
pub fn request_dialectic_review(
    store: &UnitaresStore,
    paused_agent_id: &str,
    topic: Option<String>,
    reason: Option<String>,
    discovery_id: Option<Uuid>,
    dispute_type: Option<String>,
    now: DateTime<Utc>,
) -> DialecticResult<DialecticSessionRecord> {
    let already_active = store
        .list_active_dialectic_sessions()?
        .into_iter()
        .any(|s| s.paused_agent_id == paused_agent_id);
    if already_active {
        return Err(DialecticError::AlreadyActive(paused_agent_id.to_string()));
    }

    if let Some(id) = discovery_id {
        store.get_discovery(id)?.ok_or(DialecticError::DiscoveryNotFound(id))?;
    }

    let reviewer_id = select_reviewer(store, paused_agent_id, &[], now)?;

    // A session opened without an eligible reviewer falls back to the
    // single-agent recovery path rather than a two-party dialogue.
    let session_type = if reviewer_id.is_some() { "dialogue" } else { "recovery" };

    let record = DialecticSessionRecord {
        id: Uuid::new_v4(),
        paused_agent_id: paused_agent_id.to_string(),
        reviewer_id,
        phase: Phase::AwaitingThesis.as_str().to_string(),
        status: "active".to_string(),
        session_type: session_type.to_string(),
        topic,
        reason,
        discovery_id,
        dispute_type,
        synthesis_round: 0,
        excluded_reviewer_ids: Vec::new(),
        resolution_action: None,
        active: true,
        created_at: now,
        updated_at: now,
    };
    store.upsert_dialectic_session(&record)?;
    tracing::info!(session_id = %record.id, paused_agent_id, reviewer = ?record.reviewer_id, "dialectic session opened");
    Ok(record)
}

/// Picks a reviewer from active identities, excluding the paused agent,
/// anyone already in an active session, anyone who reviewed this paused agent
/// recently, and explicitly excluded ids (spec.md §4.9 "Reviewer selection").
/// Returns `None` (deferred) when no candidate is eligible.
fn select_reviewer(
    store: &UnitaresStore,
    paused_agent_id: &str,
    excluded: &[String],
    now: DateTime<Utc>,
) -> DialecticResult<Option<String>> {
    let active_sessions = store.list_active_dialectic_sessions()?;
    let busy: std::collections::HashSet<String> = active_sessions
        .iter()
        .flat_map(|s| [Some(s.paused_agent_id.clone()), s.reviewer_id.clone()])
        .flatten()
        .collect();

    let recent_cutoff = now - chrono::Duration::hours(REVIEWER_RECENCY_HOURS);
    let mut recently_reviewed = std::collections::HashSet::new();
    for session in store.list_active_dialectic_sessions()? {
        if session.paused_agent_id == paused_agent_id && session.updated_at >= recent_cutoff {
            if let Some(reviewer) = session.reviewer_id {
                recently_reviewed.insert(reviewer);
            }
        }
    }

    let candidates = store.list_active_identities()?;
    for candidate in candidates {
        if candidate.agent_id == paused_agent_id {
            continue;
        }
        if busy.contains(&candidate.agent_id) {
            continue;
        }
        if recently_reviewed.contains(&candidate.agent_id) {
            continue;
        }
        if excluded.iter().any(|e| e == &candidate.agent_id) {
            continue;
        }
        return Ok(Some(candidate.agent_id));
    }
    Ok(None)
}

fn require_active(store: &UnitaresStore, session_id: Uuid) -> DialecticResult<DialecticSessionRecord> {
    let session = store.get_dialectic_session(session_id)?.ok_or(DialecticError::SessionNotFound(session_id))?;
    if !session.active {
        return Err(DialecticError::WrongPhase { expected: "active".to_string(), actual: session.phase });
    }
    Ok(session)
}

fn next_seq(store: &UnitaresStore, session_id: Uuid) -> DialecticResult<u32> {
    Ok(store.list_dialectic_messages(session_id)?.len() as u32)
}

fn append_message(
    store: &UnitaresStore,
    session_id: Uuid,
    agent_id: &str,
    message_type: &str,
    content: serde_json::Value,
    signature: Option<String>,
    now: DateTime<Utc>,
) -> DialecticResult<()> {
    let seq = next_seq(store, session_id)?;
    store.append_dialectic_message(&DialecticMessageRecord {
        id: Uuid::new_v4(),
        session_id,
        seq,
        agent_id: agent_id.to_string(),
        message_type: message_type.to_string(),
        content,
        signature,
        created_at: now,
    })?;
    Ok(())
}

/// `{root_cause, proposed_conditions[], reasoning?}` (spec.md §4.9 "Message submission").
pub fn submit_thesis(
    store: &UnitaresStore,
    session_id: Uuid,
    paused_agent_id: &str,
    root_cause: &str,
    proposed_conditions: Vec<String>,
    reasoning: Option<String>,
    signature: Option<String>,
    now: DateTime<Utc>,
) -> DialecticResult<DialecticSessionRecord> {
    let mut session = require_active(store, session_id)?;
    if session.paused_agent_id != paused_agent_id {
        return Err(DialecticError::NotAuthorized {
            session_id,
            caller: paused_agent_id.to_string(),
            role: "paused_agent".to_string(),
        });
    }
    if Phase::parse(&session.phase) != Phase::AwaitingThesis {
        return Err(DialecticError::WrongPhase { expected: "awaiting_thesis".to_string(), actual: session.phase });
    }

    append_message(
        store,
        session_id,
        paused_agent_id,
        "thesis",
        serde_json::json!({"root_cause": root_cause, "proposed_conditions": proposed_conditions, "reasoning": reasoning}),
        signature,
        now,
    )?;

    session.phase = Phase::Antithesis.as_str().to_string();
    session.updated_at = now;
    store.upsert_dialectic_session(&session)?;
    Ok(session)
}

/// `{observed_metrics, concerns[], reasoning?}` (spec.md §4.9).
pub fn submit_antithesis(
    store: &UnitaresStore,
    session_id: Uuid,
    reviewer_id: &str,
    observed_metrics: serde_json::Value,
    concerns: Vec<String>,
    reasoning: Option<String>,
    signature: Option<String>,
    now: DateTime<Utc>,
) -> DialecticResult<DialecticSessionRecord> {
    let mut session = require_active(store, session_id)?;
    if session.reviewer_id.as_deref() != Some(reviewer_id) {
        return Err(DialecticError::NotAuthorized {
            session_id,
            caller: reviewer_id.to_string(),
            role: "reviewer".to_string(),
        });
    }
    if Phase::parse(&session.phase) != Phase::Antithesis {
        return Err(DialecticError::WrongPhase { expected: "antithesis".to_string(), actual: session.phase });
    }

    append_message(
        store,
        session_id,
        reviewer_id,
        "antithesis",
        serde_json::json!({"observed_metrics": observed_metrics, "concerns": concerns, "reasoning": reasoning}),
        signature,
        now,
    )?;

    session.phase = Phase::Synthesis.as_str().to_string();
    session.updated_at = now;
    store.upsert_dialectic_session(&session)?;
    Ok(session)
}

/// Outcome of [`submit_synthesis`]: either the session is still gathering
/// synthesis messages, or it produced a final [`Resolution`], or it failed
/// after exhausting `max_synthesis_rounds`.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    AwaitingPeer,
    Resolved(Resolution),
    Failed,
}

/// `{proposed_conditions[], reasoning?, agrees?}` (spec.md §4.9). When both
/// parties have submitted in the current round and both agree, produces a
/// `Resolution`; otherwise advances the round or fails past
/// `max_synthesis_rounds`.
pub fn submit_synthesis(
    store: &UnitaresStore,
    session_id: Uuid,
    agent_id: &str,
    proposed_conditions: Vec<String>,
    reasoning: Option<String>,
    agrees: bool,
    signature: Option<String>,
    now: DateTime<Utc>,
) -> DialecticResult<SynthesisOutcome> {
    let mut session = require_active(store, session_id)?;
    let is_party = session.paused_agent_id == agent_id || session.reviewer_id.as_deref() == Some(agent_id);
    if !is_party {
        return Err(DialecticError::NotAuthorized { session_id, caller: agent_id.to_string(), role: "party".to_string() });
    }
    if Phase::parse(&session.phase) != Phase::Synthesis {
        return Err(DialecticError::WrongPhase { expected: "synthesis".to_string(), actual: session.phase });
    }

    append_message(
        store,
        session_id,
        agent_id,
        "synthesis",
        serde_json::json!({
            "proposed_conditions": proposed_conditions,
            "reasoning": reasoning,
            "agrees": agrees,
            "round": session.synthesis_round,
        }),
        signature,
        now,
    )?;

    let round_messages: Vec<_> = store
        .list_dialectic_messages(session_id)?
        .into_iter()
        .filter(|m| m.message_type == "synthesis" && m.content["round"] == serde_json::json!(session.synthesis_round))
        .collect();

    let paused_msg = round_messages.iter().find(|m| m.agent_id == session.paused_agent_id);
    let reviewer_msg = session
        .reviewer_id
        .as_ref()
        .and_then(|rid| round_messages.iter().find(|m| &m.agent_id == rid));

    let both_submitted = paused_msg.is_some() && (session.reviewer_id.is_none() || reviewer_msg.is_some());
    if !both_submitted {
        session.updated_at = now;
        store.upsert_dialectic_session(&session)?;
        return Ok(SynthesisOutcome::AwaitingPeer);
    }

    let both_agree = paused_msg.map(|m| m.content["agrees"] == serde_json::json!(true)).unwrap_or(false)
        && reviewer_msg.map(|m| m.content["agrees"] == serde_json::json!(true)).unwrap_or(session.reviewer_id.is_none());

    if both_agree {
        let conditions = paused_msg
            .and_then(|m| m.content["proposed_conditions"].as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let root_cause = store
            .list_dialectic_messages(session_id)?
            .into_iter()
            .find(|m| m.message_type == "thesis")
            .and_then(|m| m.content["root_cause"].as_str().map(String::from))
            .unwrap_or_default();

        session.phase = Phase::Resolved.as_str().to_string();
        session.status = "converged".to_string();
        session.active = false;
        session.updated_at = now;
        store.upsert_dialectic_session(&session)?;
        return Ok(SynthesisOutcome::Resolved(Resolution::new(ResolutionAction::Resume, conditions, root_cause)));
    }

    if session.synthesis_round + 1 < DEFAULT_MAX_SYNTHESIS_ROUNDS {
        session.synthesis_round += 1;
        session.updated_at = now;
        store.upsert_dialectic_session(&session)?;
        Ok(SynthesisOutcome::AwaitingPeer)
    } else {
        session.phase = Phase::Failed.as_str().to_string();
        session.status = "failed".to_string();
        session.active = false;
        session.updated_at = now;
        store.upsert_dialectic_session(&session)?;
        Ok(SynthesisOutcome::Failed)
    }
}

/// Applies a terminal [`Resolution`] to the target identity and session
/// (spec.md §4.9 "Resolution execution").
pub fn apply_resolution(
    store: &UnitaresStore,
    session_id: Uuid,
    resolution: &Resolution,
    now: DateTime<Utc>,
) -> DialecticResult<()> {
    let session = store.get_dialectic_session(session_id)?.ok_or(DialecticError::SessionNotFound(session_id))?;
    let mut identity = store
        .get_identity_by_agent_id(&session.paused_agent_id)?
        .ok_or_else(|| DialecticError::IdentityNotFound(session.paused_agent_id.clone()))?;

    match resolution.action {
        ResolutionAction::Resume => {
            if identity.status != unitares_core::IdentityStatus::Paused {
                return Err(DialecticError::NotPaused(session.paused_agent_id.clone()));
            }
            if let Some(mut agent_state) = store.get_agent_state(identity.agent_uuid)? {
                for condition_text in &resolution.conditions {
                    agent_state.state.dialectic_conditions.push(parse_condition(condition_text, now));
                }
                agent_state.updated_at = now;
                store.upsert_agent_state(&agent_state)?;
            }
            identity.status = unitares_core::IdentityStatus::Active;
            identity.paused_at = None;
            store.upsert_identity(&identity)?;
            store.append_audit_event(
                &session.paused_agent_id,
                "lifecycle",
                serde_json::json!({
                    "event": "dialectic_resumed",
                    "conditions": resolution.conditions,
                    "root_cause": resolution.root_cause,
                    "resolution_hash": resolution.hash,
                }),
                now,
            )?;
        }
        ResolutionAction::Block => {
            store.append_audit_event(
                &session.paused_agent_id,
                "lifecycle",
                serde_json::json!({
                    "event": "dialectic_blocked",
                    "root_cause": resolution.root_cause,
                    "resolution_hash": resolution.hash,
                }),
                now,
            )?;
        }
    }

    if let Some(discovery_id) = session.discovery_id {
        let is_dispute = matches!(session.dispute_type.as_deref(), Some("dispute") | Some("correction"));
        match (resolution.action, is_dispute) {
            (ResolutionAction::Resume, true) => {
                unitares_knowledge::update_status(store, discovery_id, DiscoveryStatus::Resolved, None, now)?;
                unitares_knowledge::update_discovery(
                    store,
                    discovery_id,
                    &session.paused_agent_id,
                    unitares_knowledge::DiscoveryUpdate {
                        append_details: Some("Dialectic resolution: correction accepted.".to_string()),
                        ..Default::default()
                    },
                    now,
                )
                .ok();
            }
            (ResolutionAction::Block, true) => {
                unitares_knowledge::update_discovery(
                    store,
                    discovery_id,
                    &session.paused_agent_id,
                    unitares_knowledge::DiscoveryUpdate {
                        append_details: Some("Dialectic resolution: dispute blocked, pending further verification.".to_string()),
                        ..Default::default()
                    },
                    now,
                )
                .ok();
            }
            _ => {}
        }
    }

    let mut session = session;
    session.resolution_action = Some(match resolution.action {
        ResolutionAction::Resume => "resume".to_string(),
        ResolutionAction::Block => "block".to_string(),
    });
    if session.status == "active" {
        session.status = "converged".to_string();
    }
    session.active = false;
    session.updated_at = now;
    store.upsert_dialectic_session(&session)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> UnitaresStore {
        UnitaresStore::open_temporary().unwrap()
    }

    fn seed_identity(store: &UnitaresStore, agent_id: &str, status: unitares_core::IdentityStatus, now: DateTime<Utc>) {
        store
            .upsert_identity(&IdentityRecord {
                agent_uuid: Uuid::new_v4(),
                agent_id: agent_id.to_string(),
                status,
                created_at: now,
                last_seen_at: now,
                paused_at: Some(now),
            })
            .unwrap();
    }

    #[test]
    fn full_happy_path_resolves_and_resumes() {
        let store = store();
        let now = Utc::now();
        seed_identity(&store, "paused-agent", unitares_core::IdentityStatus::Paused, now);
        seed_identity(&store, "reviewer-agent", unitares_core::IdentityStatus::Active, now);

        let session = request_dialectic_review(&store, "paused-agent", None, None, None, None, now).unwrap();
        assert_eq!(session.reviewer_id.as_deref(), Some("reviewer-agent"));

        let session = submit_thesis(
            &store,
            session.id,
            "paused-agent",
            "Looped on the same fix",
            vec!["Reduce complexity to 0.3".to_string()],
            None,
            None,
            now,
        )
        .unwrap();
        assert_eq!(Phase::parse(&session.phase), Phase::Antithesis);

        let session = submit_antithesis(
            &store,
            session.id,
            "reviewer-agent",
            serde_json::json!({"risk": 0.5}),
            vec![],
            None,
            None,
            now,
        )
        .unwrap();
        assert_eq!(Phase::parse(&session.phase), Phase::Synthesis);

        let outcome = submit_synthesis(
            &store,
            session.id,
            "paused-agent",
            vec!["Reduce complexity to 0.3".to_string()],
            None,
            true,
            None,
            now,
        )
        .unwrap();
        assert!(matches!(outcome, SynthesisOutcome::AwaitingPeer));

        let outcome = submit_synthesis(
            &store,
            session.id,
            "reviewer-agent",
            vec!["Reduce complexity to 0.3".to_string()],
            None,
            true,
            None,
            now,
        )
        .unwrap();
        let resolution = match outcome {
            SynthesisOutcome::Resolved(r) => r,
            other => panic!("expected Resolved, got {other:?}"),
        };
        assert_eq!(resolution.action, ResolutionAction::Resume);
        assert_eq!(resolution.root_cause, "Looped on the same fix");
        assert!(!resolution.hash.is_empty());

        apply_resolution(&store, session.id, &resolution, now).unwrap();
        let identity = store.get_identity_by_agent_id("paused-agent").unwrap().unwrap();
        assert_eq!(identity.status, unitares_core::IdentityStatus::Active);
        assert!(identity.paused_at.is_none());

        let persisted = store.get_dialectic_session(session.id).unwrap().unwrap();
        assert_eq!(persisted.status, "converged");
    }

    #[test]
    fn duplicate_active_session_is_rejected() {
        let store = store();
        let now = Utc::now();
        seed_identity(&store, "paused-agent", unitares_core::IdentityStatus::Paused, now);

        request_dialectic_review(&store, "paused-agent", None, None, None, None, now).unwrap();
        let second = request_dialectic_review(&store, "paused-agent", None, None, None, None, now);
        assert!(matches!(second, Err(DialecticError::AlreadyActive(_))));
    }

    #[test]
    fn wrong_party_cannot_submit_thesis() {
        let store = store();
        let now = Utc::now();
        seed_identity(&store, "paused-agent", unitares_core::IdentityStatus::Paused, now);

        let session = request_dialectic_review(&store, "paused-agent", None, None, None, None, now).unwrap();
        let result = submit_thesis(&store, session.id, "someone-else", "x", vec![], None, None, now);
        assert!(matches!(result, Err(DialecticError::NotAuthorized { .. })));
    }

    #[test]
    fn disagreement_advances_round_then_fails() {
        let store = store();
        let now = Utc::now();
        seed_identity(&store, "paused-agent", unitares_core::IdentityStatus::Paused, now);
        seed_identity(&store, "reviewer-agent", unitares_core::IdentityStatus::Active, now);

        let session = request_dialectic_review(&store, "paused-agent", None, None, None, None, now).unwrap();
        let session = submit_thesis(&store, session.id, "paused-agent", "root cause", vec![], None, None, now).unwrap();
        let session = submit_antithesis(&store, session.id, "reviewer-agent", serde_json::json!({}), vec![], None, None, now).unwrap();

        for _ in 0..DEFAULT_MAX_SYNTHESIS_ROUNDS {
            let out1 = submit_synthesis(&store, session.id, "paused-agent", vec![], None, false, None, now).unwrap();
            if matches!(out1, SynthesisOutcome::Failed) {
                return;
            }
            let out2 = submit_synthesis(&store, session.id, "reviewer-agent", vec![], None, false, None, now).unwrap();
            if matches!(out2, SynthesisOutcome::Failed) {
                return;
            }
        }
        panic!("expected session to fail within max_synthesis_rounds");
    }
}
