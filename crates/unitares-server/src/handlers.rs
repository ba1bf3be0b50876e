//! Representative tool handlers (spec.md §6 "External interfaces" tool list),
//! each wired through [`unitares_dispatch::dispatch_request`] via
//! [`GovernanceServer::handle`].

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use unitares_core::drift::{compute_ethical_drift, DriftInputs};
use unitares_core::eisv::{step, AgentState, StepInputs};
use unitares_core::{Decision, IdentityStatus};
use unitares_dialectic::{
    apply_resolution, check_recovery_options, operator_resume_agent, quick_resume, request_dialectic_review,
    self_recovery_review, submit_antithesis, submit_synthesis, submit_thesis, Resolution, ResolutionAction,
    SynthesisOutcome,
};
use unitares_dispatch::schema::{FieldSpec, FieldType};
use unitares_dispatch::{dispatch_request, DispatchContext, DispatchError, DispatchResult, DispatchedCall, ToolSchema, ToolSpec};
use unitares_identity::run_maintenance_sweep;
use unitares_knowledge::graph::{
    add_tag, get_discovery_with_chain, lifecycle_cleanup, store_discovery, update_discovery, update_status, DiscoveryUpdate,
    NewDiscovery,
};
use unitares_knowledge::search::{search, SearchParams, SortBy};
use unitares_knowledge::KnowledgeError;
use unitares_store::{AgentStateRecord, AuditEventFilter, DiscoveryKind, DiscoveryStatus, IdentityRecord, Severity};
use unitares_telemetry::{query as telemetry_query, record_event, QueryParams as TelemetryQueryParams};

use crate::server::GovernanceServer;

fn arg_str<'a>(call: &'a DispatchedCall, field: &str) -> Option<&'a str> {
    call.arguments.get(field).and_then(Value::as_str)
}

fn arg_f64(call: &DispatchedCall, field: &str) -> Option<f64> {
    call.arguments.get(field).and_then(Value::as_f64)
}

fn arg_bool(call: &DispatchedCall, field: &str, default: bool) -> bool {
    call.arguments.get(field).and_then(Value::as_bool).unwrap_or(default)
}

fn arg_str_vec(call: &DispatchedCall, field: &str) -> Vec<String> {
    call.arguments
        .get(field)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn arg_uuid(call: &DispatchedCall, field: &str) -> DispatchResult<Uuid> {
    let raw = arg_str(call, field).ok_or_else(|| DispatchError::MissingField(field.to_string()))?;
    Uuid::parse_str(raw).map_err(|_| DispatchError::TypeMismatch {
        field: field.to_string(),
        expected: "uuid".to_string(),
        actual: raw.to_string(),
    })
}

/// Maps a handful of known `task_type` strings to the `'static` constants
/// `StepInputs::task_context` requires; anything else degrades to `None`
/// rather than attempting to leak an owned string to `'static`.
fn known_task_context(task_type: Option<&str>) -> Option<&'static str> {
    match task_type {
        Some("coding") => Some("coding"),
        Some("research") => Some("research"),
        Some("code_review") => Some("code_review"),
        Some("debugging") => Some("debugging"),
        Some("planning") => Some("planning"),
        _ => None,
    }
}

fn load_agent_state(server: &GovernanceServer, agent_uuid: Uuid) -> DispatchResult<AgentState> {
    Ok(server
        .store
        .get_agent_state(agent_uuid)?
        .map(|record| record.state)
        .unwrap_or_else(|| AgentState::new(server.config.history_window)))
}

// ---------------------------------------------------------------------
// Identity / onboarding
// ---------------------------------------------------------------------

const ONBOARD_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("model_type", FieldType::String),
        FieldSpec::optional("client_hint", FieldType::String),
        FieldSpec::optional("client_session_id", FieldType::String),
    ],
};

pub const ONBOARD_SPEC: ToolSpec = ToolSpec { name: "onboard", schema: ONBOARD_SCHEMA, read_only: false };

fn handle_onboard(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    if let Some(ua) = &call.user_agent {
        server.resolver.pin_onboard_from_header(Some(ua.as_str()), call.identity.agent_uuid, &call.identity.client_session_id, now);
    }
    Ok(json!({
        "agent_id": call.identity.agent_id,
        "agent_uuid": call.identity.agent_uuid,
        "client_session_id": call.identity.client_session_id,
        "created": call.identity.created,
    }))
}

pub const IDENTITY_SPEC: ToolSpec = ToolSpec { name: "identity", schema: ONBOARD_SCHEMA, read_only: true };

fn handle_identity(_server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    Ok(json!({
        "agent_id": call.identity.agent_id,
        "agent_uuid": call.identity.agent_uuid,
        "client_session_id": call.identity.client_session_id,
        "created": call.identity.created,
    }))
}

// ---------------------------------------------------------------------
// Governance check-in (C4-C7)
// ---------------------------------------------------------------------

const PROCESS_UPDATE_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("client_session_id", FieldType::String),
        FieldSpec::optional("response_text", FieldType::String),
        FieldSpec::optional("e_input", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("i_input", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("s_input", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("confidence", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("complexity", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("ethical_drift_norm", FieldType::Number).with_range(0.0, 2.0),
        FieldSpec::optional("task_type", FieldType::String),
    ],
};

/// Raw-override step inputs, used only by `simulate_update`: a dry run has no
/// business mutating the in-memory continuity/drift state a real check-in
/// would advance, so it takes E/I/S/drift directly rather than grounding them.
fn step_inputs_from(call: &DispatchedCall) -> StepInputs {
    StepInputs {
        e_input: arg_f64(call, "e_input").unwrap_or(0.5),
        i_input: arg_f64(call, "i_input").unwrap_or(0.5),
        s_input: arg_f64(call, "s_input").unwrap_or(0.2),
        confidence: arg_f64(call, "confidence").unwrap_or(0.5),
        complexity: arg_f64(call, "complexity").unwrap_or(0.3),
        ethical_drift_norm: arg_f64(call, "ethical_drift_norm").unwrap_or(0.0),
        task_context: known_task_context(arg_str(call, "task_type")),
    }
}

fn step_outcome_json(outcome: &unitares_core::eisv::StepOutcome) -> Value {
    json!({
        "decision": outcome.decision,
        "health": outcome.health,
        "regime": outcome.regime,
        "risk_score": outcome.risk_score,
        "coherence": outcome.coherence,
        "margin": outcome.margin,
        "void_active": outcome.void_active,
        "guidance": outcome.guidance,
        "loop_detected": outcome.loop_detected,
    })
}

pub const PROCESS_AGENT_UPDATE_SPEC: ToolSpec =
    ToolSpec { name: "process_agent_update", schema: PROCESS_UPDATE_SCHEMA, read_only: false };

/// Drives C5 (dual-log continuity) + C6 (ethical drift) + C4 (EISV dynamics)
/// + C7 (calibration) for one check-in, in that pipeline order, then persists
/// the resulting agent state.
fn handle_process_agent_update(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let agent_id = call.identity.agent_id.clone();
    let mut state = load_agent_state(server, call.identity.agent_uuid)?;

    let response_text = arg_str(call, "response_text").unwrap_or("");
    let self_complexity = arg_f64(call, "complexity");
    let self_confidence = arg_f64(call, "confidence");
    let task_type = arg_str(call, "task_type").map(String::from);
    let task_context = known_task_context(task_type.as_deref());

    let (calibration_weight, _) = server.calibration_tracker_for(&agent_id).calibrate(self_confidence.unwrap_or(0.5));

    let mut continuity = server.continuity_log_for(&agent_id);
    let metrics = continuity.process_update(
        &agent_id,
        response_text,
        self_complexity,
        self_confidence,
        &call.identity.client_session_id,
        task_type,
        now,
        calibration_weight,
    );
    drop(continuity);

    let restorative = server.restorative_monitor_for(&agent_id).record(now, metrics.complexity_divergence);

    let last_decision = state.recent_decisions.back().map(|d| d.to_string());
    let mut baseline = server.drift_baseline_for(&agent_id);
    let drift_vector = compute_ethical_drift(
        &mut baseline,
        DriftInputs {
            current_coherence: state.coherence,
            current_confidence: self_confidence.unwrap_or(calibration_weight),
            complexity_divergence: metrics.complexity_divergence,
            calibration_error: None,
            decision: last_decision.as_deref(),
            state_velocity: None,
            task_context,
        },
        now,
    );

    let inputs = StepInputs {
        e_input: metrics.e_input,
        i_input: metrics.i_input,
        s_input: metrics.s_input,
        confidence: self_confidence.unwrap_or(calibration_weight),
        complexity: metrics.derived_complexity,
        ethical_drift_norm: drift_vector.norm_squared(),
        task_context,
    };
    let outcome = step(&mut state, inputs, &server.config, now);

    server.store.upsert_agent_state(&AgentStateRecord { agent_uuid: call.identity.agent_uuid, state: state.clone(), updated_at: now })?;

    server.calibration_tracker_for(&agent_id).record_prediction(self_confidence.unwrap_or(calibration_weight), "process_agent_update", now);

    if outcome.decision == Decision::Reject {
        let mut identity = server
            .store
            .get_identity_by_uuid(call.identity.agent_uuid)?
            .ok_or_else(|| DispatchError::Handler("identity vanished between resolve and update".to_string()))?;
        identity.status = IdentityStatus::Paused;
        identity.paused_at = Some(now);
        server.store.upsert_identity(&identity)?;
    }

    record_event(
        &server.store,
        &agent_id,
        unitares_telemetry::EVENT_COMPLEXITY_DERIVATION,
        outcome.margin,
        json!({"decision": outcome.decision, "risk_score": outcome.risk_score, "derived_complexity": metrics.derived_complexity}),
        None,
        now,
    )
    .map_err(|e| DispatchError::Handler(e.to_string()))?;

    let mut payload = step_outcome_json(&outcome);
    payload["eisv_labels"] = json!({"e": state.e, "i": state.i, "s": state.s, "v": state.v});
    payload["metrics"] = serde_json::to_value(&metrics).unwrap_or(Value::Null);
    payload["drift"] = json!({
        "calibration_deviation": drift_vector.calibration_deviation,
        "complexity_divergence": drift_vector.complexity_divergence,
        "coherence_deviation": drift_vector.coherence_deviation,
        "stability_deviation": drift_vector.stability_deviation,
        "norm": drift_vector.norm(),
    });
    payload["restorative"] = serde_json::to_value(&restorative).unwrap_or(Value::Null);
    Ok(payload)
}

pub const SIMULATE_UPDATE_SPEC: ToolSpec = ToolSpec { name: "simulate_update", schema: PROCESS_UPDATE_SCHEMA, read_only: true };

fn handle_simulate_update(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let state = load_agent_state(server, call.identity.agent_uuid)?;
    let (next, outcome) = unitares_core::eisv::simulate(&state, step_inputs_from(call), &server.config, now);
    let mut payload = step_outcome_json(&outcome);
    payload["eisv_labels"] = json!({"e": next.e, "i": next.i, "s": next.s, "v": next.v});
    Ok(payload)
}

const GOVERNANCE_METRICS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[FieldSpec::optional("lite", FieldType::Bool), FieldSpec::optional("include_state", FieldType::Bool)],
};

pub const GET_GOVERNANCE_METRICS_SPEC: ToolSpec =
    ToolSpec { name: "get_governance_metrics", schema: GOVERNANCE_METRICS_SCHEMA, read_only: true };

fn handle_get_governance_metrics(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let state = load_agent_state(server, call.identity.agent_uuid)?;
    let lite = arg_bool(call, "lite", false);
    if lite {
        return Ok(json!({"coherence": state.coherence, "risk_score": state.risk_score, "regime": state.regime}));
    }
    let mut payload = json!({
        "coherence": state.coherence,
        "risk_score": state.risk_score,
        "regime": state.regime,
        "health_status": state.health_status,
        "void_active": state.v,
        "update_count": state.update_count,
        "margin": unitares_core::eisv::compute_margin(state.risk_score, state.coherence, &server.config),
    });
    if arg_bool(call, "include_state", false) {
        payload["state"] = serde_json::to_value(&state).unwrap_or(Value::Null);
    }
    Ok(payload)
}

// ---------------------------------------------------------------------
// Knowledge graph (C8)
// ---------------------------------------------------------------------

const STORE_KNOWLEDGE_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::required("summary", FieldType::String),
        FieldSpec::optional("details", FieldType::String),
        FieldSpec::optional("kind", FieldType::String).with_enum(&[
            "bug_found",
            "insight",
            "pattern",
            "improvement",
            "question",
            "note",
            "architectural_decision",
        ]),
        FieldSpec::optional("severity", FieldType::String).with_enum(&["low", "medium", "high", "critical"]),
        FieldSpec::optional("tags", FieldType::Array),
        FieldSpec::optional("confidence", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("references_files", FieldType::Array),
    ],
};

fn parse_kind(s: Option<&str>) -> DiscoveryKind {
    match s {
        Some("bug_found") => DiscoveryKind::BugFound,
        Some("pattern") => DiscoveryKind::Pattern,
        Some("improvement") => DiscoveryKind::Improvement,
        Some("question") => DiscoveryKind::Question,
        Some("architectural_decision") => DiscoveryKind::ArchitecturalDecision,
        Some("note") => DiscoveryKind::Note,
        _ => DiscoveryKind::Insight,
    }
}

fn parse_severity(s: Option<&str>) -> Severity {
    match s {
        Some("medium") => Severity::Medium,
        Some("high") => Severity::High,
        Some("critical") => Severity::Critical,
        _ => Severity::Low,
    }
}

pub const STORE_KNOWLEDGE_SPEC: ToolSpec = ToolSpec { name: "store_knowledge", schema: STORE_KNOWLEDGE_SCHEMA, read_only: false };

fn handle_store_knowledge(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let record = store_discovery(
        &server.store,
        NewDiscovery {
            agent_id: call.identity.agent_id.clone(),
            kind: parse_kind(arg_str(call, "kind")),
            severity: parse_severity(arg_str(call, "severity")),
            summary: arg_str(call, "summary").unwrap_or_default().to_string(),
            details: arg_str(call, "details").unwrap_or_default().to_string(),
            tags: arg_str_vec(call, "tags"),
            confidence: arg_f64(call, "confidence"),
            references_files: arg_str_vec(call, "references_files"),
            provenance: None,
        },
        now,
    )
    .map_err(DispatchError::from)?;
    Ok(json!({"discovery_id": record.id}))
}

const SEARCH_KNOWLEDGE_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("query", FieldType::String),
        FieldSpec::optional("tag", FieldType::String),
        FieldSpec::optional("agent_id", FieldType::String),
        FieldSpec::optional("sort_by", FieldType::String).with_enum(&["created_at", "relevance", "score", "related_count"]),
        FieldSpec::optional("limit", FieldType::Number).with_range(1.0, 500.0),
    ],
};

pub const SEARCH_KNOWLEDGE_SPEC: ToolSpec = ToolSpec { name: "search_knowledge", schema: SEARCH_KNOWLEDGE_SCHEMA, read_only: true };

fn handle_search_knowledge(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let sort_by = match arg_str(call, "sort_by") {
        Some("relevance") => Some(SortBy::Relevance),
        Some("score") => Some(SortBy::Score),
        Some("related_count") => Some(SortBy::RelatedCount),
        Some("created_at") => Some(SortBy::CreatedAt),
        _ => None,
    };
    let params = SearchParams {
        agent_id: arg_str(call, "agent_id").map(String::from),
        tag: arg_str(call, "tag").map(String::from),
        query: arg_str(call, "query").map(String::from),
        sort_by,
        limit: arg_f64(call, "limit").map(|n| n as usize),
        ..Default::default()
    };
    let results = search(&server.store, &params).map_err(DispatchError::from)?;
    let items: Vec<Value> = results
        .into_iter()
        .map(|r| json!({"discovery": r.discovery, "score": r.score, "related_count": r.related_count}))
        .collect();
    Ok(json!({"results": items}))
}

const DISCOVERY_ID_SCHEMA: ToolSchema = ToolSchema {
    fields: &[FieldSpec::required("discovery_id", FieldType::String), FieldSpec::optional("follow_chain", FieldType::Bool)],
};

pub const GET_DISCOVERY_DETAILS_SPEC: ToolSpec =
    ToolSpec { name: "get_discovery_details", schema: DISCOVERY_ID_SCHEMA, read_only: true };

fn handle_get_discovery_details(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let id = arg_uuid(call, "discovery_id")?;
    let chain = get_discovery_with_chain(&server.store, id, arg_bool(call, "follow_chain", false)).map_err(DispatchError::from)?;
    Ok(json!({"discovery": chain.root, "chain": chain.chain, "truncated": chain.truncated}))
}

const UPDATE_DISCOVERY_STATUS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::required("discovery_id", FieldType::String),
        FieldSpec::required("action", FieldType::String).with_enum(&["update", "resolve", "supersede", "archive"]),
        FieldSpec::optional("superseded_by", FieldType::String),
        FieldSpec::optional("append_details", FieldType::String),
        FieldSpec::optional("tags", FieldType::Array),
        FieldSpec::optional("severity", FieldType::String).with_enum(&["low", "medium", "high", "critical"]),
    ],
};

pub const UPDATE_DISCOVERY_STATUS_GRAPH_SPEC: ToolSpec =
    ToolSpec { name: "update_discovery_status_graph", schema: UPDATE_DISCOVERY_STATUS_SCHEMA, read_only: false };

fn handle_update_discovery_status_graph(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let id = arg_uuid(call, "discovery_id")?;
    let action = arg_str(call, "action").unwrap_or("update");

    if action == "update" {
        let update = DiscoveryUpdate {
            summary: None,
            details: None,
            append_details: arg_str(call, "append_details").map(String::from),
            tags: {
                let tags = arg_str_vec(call, "tags");
                if tags.is_empty() { None } else { Some(tags) }
            },
            severity: arg_str(call, "severity").map(|s| parse_severity(Some(s))),
        };
        let record = update_discovery(&server.store, id, &call.identity.agent_id, update, now).map_err(DispatchError::from)?;
        return Ok(json!({"discovery": record}));
    }

    let new_status = match action {
        "resolve" => DiscoveryStatus::Resolved,
        "supersede" => DiscoveryStatus::Superseded,
        "archive" => DiscoveryStatus::Archived,
        other => return Err(DispatchError::InvalidEnum {
            field: "action".to_string(),
            allowed: vec!["update".to_string(), "resolve".to_string(), "supersede".to_string(), "archive".to_string()],
            actual: other.to_string(),
        }),
    };
    let superseded_by = match arg_str(call, "superseded_by") {
        Some(s) => Some(Uuid::parse_str(s).map_err(|_| DispatchError::TypeMismatch {
            field: "superseded_by".to_string(),
            expected: "uuid".to_string(),
            actual: s.to_string(),
        })?),
        None => None,
    };
    let record = update_status(&server.store, id, new_status, superseded_by, now).map_err(DispatchError::from)?;
    Ok(json!({"discovery": record}))
}

const LEAVE_NOTE_SCHEMA: ToolSchema = ToolSchema {
    fields: &[FieldSpec::required("discovery_id", FieldType::String), FieldSpec::required("tag", FieldType::String)],
};

pub const LEAVE_NOTE_SPEC: ToolSpec = ToolSpec { name: "leave_note", schema: LEAVE_NOTE_SCHEMA, read_only: false };

fn handle_leave_note(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let id = arg_uuid(call, "discovery_id")?;
    let tag = arg_str(call, "tag").unwrap_or_default().to_string();
    let record = add_tag(&server.store, id, tag, now).map_err(DispatchError::from)?;
    Ok(json!({"discovery": record}))
}

const CLEANUP_KNOWLEDGE_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("max_age_days", FieldType::Number).with_range(1.0, 3650.0),
        FieldSpec::optional("dry_run", FieldType::Bool),
    ],
};

pub const CLEANUP_KNOWLEDGE_GRAPH_SPEC: ToolSpec =
    ToolSpec { name: "cleanup_knowledge_graph", schema: CLEANUP_KNOWLEDGE_SCHEMA, read_only: false };

fn handle_cleanup_knowledge_graph(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let max_age_days = arg_f64(call, "max_age_days").unwrap_or(90.0) as i64;
    let dry_run = arg_bool(call, "dry_run", true);
    let report = lifecycle_cleanup(&server.store, max_age_days, now, dry_run).map_err(DispatchError::from)?;
    Ok(serde_json::to_value(report).unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------
// Dialectic review (C9)
// ---------------------------------------------------------------------

const REQUEST_REVIEW_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("topic", FieldType::String),
        FieldSpec::optional("reason", FieldType::String),
        FieldSpec::optional("discovery_id", FieldType::String),
        FieldSpec::optional("dispute_type", FieldType::String),
    ],
};

pub const REQUEST_DIALECTIC_REVIEW_SPEC: ToolSpec =
    ToolSpec { name: "request_dialectic_review", schema: REQUEST_REVIEW_SCHEMA, read_only: false };

fn handle_request_dialectic_review(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let discovery_id = match arg_str(call, "discovery_id") {
        Some(s) => Some(Uuid::parse_str(s).map_err(|_| DispatchError::TypeMismatch {
            field: "discovery_id".to_string(),
            expected: "uuid".to_string(),
            actual: s.to_string(),
        })?),
        None => None,
    };
    let session = request_dialectic_review(
        &server.store,
        &call.identity.agent_id,
        arg_str(call, "topic").map(String::from),
        arg_str(call, "reason").map(String::from),
        discovery_id,
        arg_str(call, "dispute_type").map(String::from),
        now,
    )
    .map_err(DispatchError::from)?;
    Ok(serde_json::to_value(session).unwrap_or(Value::Null))
}

const SUBMIT_THESIS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::required("session_id", FieldType::String),
        FieldSpec::required("root_cause", FieldType::String),
        FieldSpec::optional("proposed_conditions", FieldType::Array),
        FieldSpec::optional("reasoning", FieldType::String),
        FieldSpec::optional("signature", FieldType::String),
    ],
};

pub const SUBMIT_THESIS_SPEC: ToolSpec = ToolSpec { name: "submit_thesis", schema: SUBMIT_THESIS_SCHEMA, read_only: false };

fn handle_submit_thesis(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let session_id = arg_uuid(call, "session_id")?;
    let session = submit_thesis(
        &server.store,
        session_id,
        &call.identity.agent_id,
        arg_str(call, "root_cause").unwrap_or_default(),
        arg_str_vec(call, "proposed_conditions"),
        arg_str(call, "reasoning").map(String::from),
        arg_str(call, "signature").map(String::from),
        now,
    )
    .map_err(DispatchError::from)?;
    Ok(serde_json::to_value(session).unwrap_or(Value::Null))
}

const SUBMIT_ANTITHESIS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::required("session_id", FieldType::String),
        FieldSpec::optional("observed_metrics", FieldType::Object),
        FieldSpec::optional("concerns", FieldType::Array),
        FieldSpec::optional("reasoning", FieldType::String),
        FieldSpec::optional("signature", FieldType::String),
    ],
};

pub const SUBMIT_ANTITHESIS_SPEC: ToolSpec = ToolSpec { name: "submit_antithesis", schema: SUBMIT_ANTITHESIS_SCHEMA, read_only: false };

fn handle_submit_antithesis(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let session_id = arg_uuid(call, "session_id")?;
    let session = submit_antithesis(
        &server.store,
        session_id,
        &call.identity.agent_id,
        call.arguments.get("observed_metrics").cloned().unwrap_or_else(|| json!({})),
        arg_str_vec(call, "concerns"),
        arg_str(call, "reasoning").map(String::from),
        arg_str(call, "signature").map(String::from),
        now,
    )
    .map_err(DispatchError::from)?;
    Ok(serde_json::to_value(session).unwrap_or(Value::Null))
}

const SUBMIT_SYNTHESIS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::required("session_id", FieldType::String),
        FieldSpec::optional("proposed_conditions", FieldType::Array),
        FieldSpec::optional("reasoning", FieldType::String),
        FieldSpec::optional("agrees", FieldType::Bool),
        FieldSpec::optional("signature", FieldType::String),
    ],
};

pub const SUBMIT_SYNTHESIS_SPEC: ToolSpec = ToolSpec { name: "submit_synthesis", schema: SUBMIT_SYNTHESIS_SCHEMA, read_only: false };

fn handle_submit_synthesis(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let session_id = arg_uuid(call, "session_id")?;
    let outcome = submit_synthesis(
        &server.store,
        session_id,
        &call.identity.agent_id,
        arg_str_vec(call, "proposed_conditions"),
        arg_str(call, "reasoning").map(String::from),
        arg_bool(call, "agrees", false),
        arg_str(call, "signature").map(String::from),
        now,
    )
    .map_err(DispatchError::from)?;

    match outcome {
        SynthesisOutcome::AwaitingPeer => Ok(json!({"outcome": "awaiting_peer"})),
        SynthesisOutcome::Failed => Ok(json!({"outcome": "failed"})),
        SynthesisOutcome::Resolved(resolution) => {
            apply_resolution(&server.store, session_id, &resolution, now).map_err(DispatchError::from)?;
            Ok(json!({
                "outcome": "resolved",
                "action": match resolution.action { ResolutionAction::Resume => "resume", ResolutionAction::Block => "block" },
                "conditions": resolution.conditions,
                "root_cause": resolution.root_cause,
                "resolution_hash": resolution.hash,
            }))
        }
    }
}

const SESSION_ID_SCHEMA: ToolSchema = ToolSchema { fields: &[FieldSpec::required("session_id", FieldType::String)] };

pub const GET_DIALECTIC_SESSION_SPEC: ToolSpec = ToolSpec { name: "get_dialectic_session", schema: SESSION_ID_SCHEMA, read_only: true };

fn handle_get_dialectic_session(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let session_id = arg_uuid(call, "session_id")?;
    let session = server
        .store
        .get_dialectic_session(session_id)?
        .ok_or_else(|| DispatchError::Handler(format!("dialectic session {session_id} not found")))?;
    let messages = server.store.list_dialectic_messages(session_id)?;
    Ok(json!({"session": session, "messages": messages}))
}

const LIST_DIALECTIC_SESSIONS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("agent_id", FieldType::String),
        FieldSpec::optional("status", FieldType::String),
        FieldSpec::optional("limit", FieldType::Number),
        FieldSpec::optional("include_transcript", FieldType::Bool),
    ],
};

pub const LIST_DIALECTIC_SESSIONS_SPEC: ToolSpec =
    ToolSpec { name: "list_dialectic_sessions", schema: LIST_DIALECTIC_SESSIONS_SCHEMA, read_only: true };

fn handle_list_dialectic_sessions(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let filter = unitares_store::DialecticSessionFilter {
        agent_id: arg_str(call, "agent_id").map(String::from),
        status: arg_str(call, "status").map(String::from),
        limit: arg_f64(call, "limit").map(|n| n.max(0.0) as usize).or(Some(10)),
    };
    let sessions = server.store.query_dialectic_sessions(&filter)?;
    let include_transcript = arg_bool(call, "include_transcript", false);

    if include_transcript {
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let messages = server.store.list_dialectic_messages(session.id)?;
            out.push(json!({"session": session, "messages": messages}));
        }
        Ok(json!({"sessions": out}))
    } else {
        Ok(json!({"sessions": sessions}))
    }
}

// ---------------------------------------------------------------------
// Self-recovery (C10)
// ---------------------------------------------------------------------

const REFLECTION_SCHEMA: ToolSchema = ToolSchema {
    fields: &[FieldSpec::optional("reflection", FieldType::String), FieldSpec::optional("conditions", FieldType::Array)],
};

pub const QUICK_RESUME_SPEC: ToolSpec = ToolSpec { name: "quick_resume", schema: ToolSchema { fields: &[] }, read_only: false };

fn handle_quick_resume(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let state = load_agent_state(server, call.identity.agent_uuid)?;
    quick_resume(&server.store, &call.identity.agent_id, &state, now).map_err(DispatchError::from)?;
    Ok(json!({"agent_id": call.identity.agent_id, "status": "active"}))
}

pub const SELF_RECOVERY_REVIEW_SPEC: ToolSpec =
    ToolSpec { name: "self_recovery_review", schema: REFLECTION_SCHEMA, read_only: false };

fn handle_self_recovery_review(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let state = load_agent_state(server, call.identity.agent_uuid)?;
    let reflection = arg_str(call, "reflection").unwrap_or_default();
    let conditions = arg_str_vec(call, "conditions");
    let assessment =
        self_recovery_review(&server.store, &call.identity.agent_id, &state, reflection, conditions, now).map_err(DispatchError::from)?;
    Ok(json!({"safe": assessment.safe, "warnings": assessment.warnings, "reason": assessment.reason}))
}

pub const CHECK_RECOVERY_OPTIONS_SPEC: ToolSpec =
    ToolSpec { name: "check_recovery_options", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_check_recovery_options(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let state = load_agent_state(server, call.identity.agent_uuid)?;
    let options = check_recovery_options(&state);
    Ok(serde_json::to_value(options).unwrap_or(Value::Null))
}

const OPERATOR_RESUME_SCHEMA: ToolSchema = ToolSchema {
    fields: &[FieldSpec::required("agent_id", FieldType::String), FieldSpec::required("operator_note", FieldType::String)],
};

pub const OPERATOR_RESUME_AGENT_SPEC: ToolSpec =
    ToolSpec { name: "operator_resume_agent", schema: OPERATOR_RESUME_SCHEMA, read_only: false };

fn handle_operator_resume_agent(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let agent_id = arg_str(call, "agent_id").unwrap_or_default();
    let note = arg_str(call, "operator_note").unwrap_or_default();
    operator_resume_agent(&server.store, agent_id, note, now).map_err(DispatchError::from)?;
    Ok(json!({"agent_id": agent_id, "status": "active"}))
}

// ---------------------------------------------------------------------
// Calibration (C7)
// ---------------------------------------------------------------------

const CALIBRATION_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::required("confidence", FieldType::Number).with_range(0.0, 1.0),
        FieldSpec::optional("task_type", FieldType::String),
    ],
};

pub const CALIBRATION_SPEC: ToolSpec = ToolSpec { name: "calibration", schema: CALIBRATION_SCHEMA, read_only: false };

fn handle_calibration(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let confidence = arg_f64(call, "confidence").unwrap_or(0.5);
    let mut tracker = server.calibration_tracker_for(&call.identity.agent_id);
    let (corrected, explanation) = tracker.calibrate(confidence);
    let prediction_id = tracker.record_prediction(confidence, arg_str(call, "task_type").unwrap_or("general"), now);
    Ok(json!({
        "prediction_id": prediction_id,
        "raw_confidence": confidence,
        "calibrated_confidence": corrected,
        "explanation": explanation,
    }))
}

pub const CHECK_CALIBRATION_SPEC: ToolSpec = ToolSpec { name: "check_calibration", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_check_calibration(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let tracker = server.calibration_tracker_for(&call.identity.agent_id);
    let report = tracker.check(server.config.calibration_min_samples, server.config.calibration_error_threshold);
    Ok(json!({
        "report": report,
        "drift": tracker.detect_drift(),
        "pending_count": tracker.pending_count(),
    }))
}

pub const REBUILD_CALIBRATION_SPEC: ToolSpec = ToolSpec { name: "rebuild_calibration", schema: ToolSchema { fields: &[] }, read_only: false };

fn handle_rebuild_calibration(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    server.calibration.remove(&call.identity.agent_id);
    let tracker = server.calibration_tracker_for(&call.identity.agent_id);
    record_event(
        &server.store,
        &call.identity.agent_id,
        unitares_telemetry::EVENT_CALIBRATION_CHECK,
        0.0,
        json!({"event": "rebuilt"}),
        None,
        now,
    )
    .map_err(|e| DispatchError::Handler(e.to_string()))?;
    Ok(json!({"agent_id": call.identity.agent_id, "pending_count": tracker.pending_count()}))
}

const UPDATE_GROUND_TRUTH_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("prediction_id", FieldType::String),
        FieldSpec::required("correct", FieldType::Bool),
        FieldSpec::optional("weight", FieldType::Number).with_range(0.0, 1.0),
    ],
};

pub const UPDATE_CALIBRATION_GROUND_TRUTH_SPEC: ToolSpec =
    ToolSpec { name: "update_calibration_ground_truth", schema: UPDATE_GROUND_TRUTH_SCHEMA, read_only: false };

fn handle_update_calibration_ground_truth(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let prediction_id = arg_str(call, "prediction_id");
    let correct = arg_bool(call, "correct", false);
    let weight = arg_f64(call, "weight").unwrap_or(1.0);
    let mut tracker = server.calibration_tracker_for(&call.identity.agent_id);
    tracker.resolve_prediction(prediction_id, correct, weight).map_err(DispatchError::from)?;
    Ok(json!({"prediction_id": prediction_id, "resolved": true}))
}

pub const BACKFILL_CALIBRATION_FROM_DIALECTIC_SPEC: ToolSpec =
    ToolSpec { name: "backfill_calibration_from_dialectic", schema: ToolSchema { fields: &[] }, read_only: false };

fn handle_backfill_calibration_from_dialectic(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let sessions = server.store.list_active_dialectic_sessions()?;
    let mut backfilled = 0u32;
    let mut tracker = server.calibration_tracker_for(&call.identity.agent_id);
    for session in sessions.iter().filter(|s| s.paused_agent_id == call.identity.agent_id) {
        for message in server.store.list_dialectic_messages(session.id)? {
            if message.message_type == "synthesis" {
                if let Some(agrees) = message.content.get("agrees").and_then(Value::as_bool) {
                    tracker.record_outcome(if agrees { 0.8 } else { 0.3 }, agrees);
                    backfilled += 1;
                }
            }
        }
    }
    Ok(json!({"backfilled": backfilled}))
}

// ---------------------------------------------------------------------
// Agent management (C2, C3)
// ---------------------------------------------------------------------

pub const LIST_AGENTS_SPEC: ToolSpec = ToolSpec { name: "list_agents", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_list_agents(server: &GovernanceServer, _call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let identities = server.store.list_all_identities()?;
    Ok(json!({"agents": identities}))
}

const AGENT_ID_SCHEMA: ToolSchema = ToolSchema { fields: &[FieldSpec::required("agent_id", FieldType::String)] };

pub const GET_AGENT_METADATA_SPEC: ToolSpec = ToolSpec { name: "get_agent_metadata", schema: AGENT_ID_SCHEMA, read_only: true };

fn handle_get_agent_metadata(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let agent_id = arg_str(call, "agent_id").unwrap_or(&call.identity.agent_id);
    let identity = server
        .store
        .get_identity_by_agent_id(agent_id)?
        .ok_or_else(|| DispatchError::Handler(format!("agent {agent_id} not found")))?;
    Ok(json!({"identity": identity}))
}

/// `IdentityRecord` carries no freeform metadata field (spec.md §3 lists
/// status/timestamps only); this is a status no-op returning the record as-is.
pub const UPDATE_AGENT_METADATA_SPEC: ToolSpec = ToolSpec { name: "update_agent_metadata", schema: AGENT_ID_SCHEMA, read_only: true };

fn handle_update_agent_metadata(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    handle_get_agent_metadata(server, call, _now)
}

fn set_identity_status(server: &GovernanceServer, agent_id: &str, status: IdentityStatus, now: DateTime<Utc>) -> DispatchResult<IdentityRecord> {
    let mut identity = server
        .store
        .get_identity_by_agent_id(agent_id)?
        .ok_or_else(|| DispatchError::Handler(format!("agent {agent_id} not found")))?;
    identity.status = status;
    if status == IdentityStatus::Paused {
        identity.paused_at = Some(now);
    } else if status == IdentityStatus::Active {
        identity.paused_at = None;
    }
    server.store.upsert_identity(&identity)?;
    Ok(identity)
}

pub const ARCHIVE_AGENT_SPEC: ToolSpec = ToolSpec { name: "archive_agent", schema: AGENT_ID_SCHEMA, read_only: false };

fn handle_archive_agent(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let agent_id = arg_str(call, "agent_id").unwrap_or(&call.identity.agent_id);
    let identity = set_identity_status(server, agent_id, IdentityStatus::Archived, now)?;
    Ok(json!({"identity": identity}))
}

pub const RESUME_AGENT_SPEC: ToolSpec = ToolSpec { name: "resume_agent", schema: AGENT_ID_SCHEMA, read_only: false };

fn handle_resume_agent(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let agent_id = arg_str(call, "agent_id").unwrap_or(&call.identity.agent_id);
    let identity = set_identity_status(server, agent_id, IdentityStatus::Active, now)?;
    Ok(json!({"identity": identity}))
}

pub const DELETE_AGENT_SPEC: ToolSpec = ToolSpec { name: "delete_agent", schema: AGENT_ID_SCHEMA, read_only: false };

fn handle_delete_agent(server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let agent_id = arg_str(call, "agent_id").unwrap_or(&call.identity.agent_id);
    let identity = set_identity_status(server, agent_id, IdentityStatus::Deleted, now)?;
    Ok(json!({"identity": identity}))
}

pub const PING_AGENT_SPEC: ToolSpec = ToolSpec { name: "ping_agent", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_ping_agent(_server: &GovernanceServer, call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    Ok(json!({"agent_id": call.identity.agent_id, "pong_at": now}))
}

pub const DETECT_STUCK_AGENTS_SPEC: ToolSpec =
    ToolSpec { name: "detect_stuck_agents", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_detect_stuck_agents(server: &GovernanceServer, _call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let stuck_cutoff = now - chrono::Duration::hours(server.config.stuck_session_hours);
    let stuck: Vec<Value> = server
        .store
        .list_active_identities()?
        .into_iter()
        .filter(|identity| identity.status == IdentityStatus::Paused && identity.paused_at.map(|t| t < stuck_cutoff).unwrap_or(false))
        .map(|identity| json!({"agent_id": identity.agent_id, "paused_at": identity.paused_at}))
        .collect();
    Ok(json!({"stuck_agents": stuck}))
}

// ---------------------------------------------------------------------
// Telemetry and health (C1, C12)
// ---------------------------------------------------------------------

pub const HEALTH_CHECK_SPEC: ToolSpec = ToolSpec { name: "health_check", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_health_check(server: &GovernanceServer, _call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let probe = server.store.health_probe()?;
    Ok(serde_json::to_value(probe).unwrap_or(Value::Null))
}

pub const GET_SERVER_INFO_SPEC: ToolSpec = ToolSpec { name: "get_server_info", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_get_server_info(server: &GovernanceServer, _call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    Ok(json!({
        "schema_version": unitares_store::SCHEMA_VERSION,
        "tracked_workers": server.registry.tracked_count(),
        "held_locks": server.locks.held_count(),
    }))
}

const TELEMETRY_METRICS_SCHEMA: ToolSchema = ToolSchema {
    fields: &[
        FieldSpec::optional("agent_id", FieldType::String),
        FieldSpec::optional("event_type", FieldType::String),
        FieldSpec::optional("limit", FieldType::Number).with_range(1.0, 500.0),
    ],
};

pub const GET_TELEMETRY_METRICS_SPEC: ToolSpec =
    ToolSpec { name: "get_telemetry_metrics", schema: TELEMETRY_METRICS_SCHEMA, read_only: true };

fn handle_get_telemetry_metrics(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let params = TelemetryQueryParams {
        agent_id: arg_str(call, "agent_id").map(String::from),
        event_type: arg_str(call, "event_type").map(String::from),
        start: None,
        end: None,
        limit: arg_f64(call, "limit").map(|n| n as usize),
        order: unitares_store::SortOrder::Desc,
    };
    let events = telemetry_query(&server.store, &params).map_err(|e| DispatchError::Handler(e.to_string()))?;
    Ok(json!({"events": events}))
}

pub const GET_TOOL_USAGE_STATS_SPEC: ToolSpec =
    ToolSpec { name: "get_tool_usage_stats", schema: ToolSchema { fields: &[] }, read_only: true };

fn handle_get_tool_usage_stats(server: &GovernanceServer, call: &DispatchedCall, _now: DateTime<Utc>) -> DispatchResult<Value> {
    let events = server
        .store
        .query_audit_events(&AuditEventFilter { agent_id: Some(call.identity.agent_id.clone()), ..Default::default() })?;
    let mut counts = std::collections::HashMap::new();
    for event in &events {
        *counts.entry(event.event_type.clone()).or_insert(0u64) += 1;
    }
    Ok(json!({"agent_id": call.identity.agent_id, "event_counts": counts, "total": events.len()}))
}

pub const CLEANUP_STALE_LOCKS_SPEC: ToolSpec = ToolSpec { name: "cleanup_stale_locks", schema: ToolSchema { fields: &[] }, read_only: false };

fn handle_cleanup_stale_locks(server: &GovernanceServer, _call: &DispatchedCall, now: DateTime<Utc>) -> DispatchResult<Value> {
    let (zombies, stale_locks) = run_maintenance_sweep(&server.registry, &server.locks, now);
    Ok(json!({"zombie_workers_removed": zombies, "stale_locks_released": stale_locks}))
}

// ---------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------

impl GovernanceServer {
    /// Runs the full tool-dispatch pipeline for one named call, looking up
    /// the matching [`ToolSpec`] and handler (spec.md §4.11, §6 "Representative tools").
    pub fn handle(
        &self,
        tool_name: &str,
        arguments: Value,
        session_key: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Value {
        let ctx = DispatchContext { store: &self.store, resolver: &self.resolver, limiter: &self.limiter };

        macro_rules! route {
            ($(($spec:expr, $handler:expr)),+ $(,)?) => {
                match tool_name {
                    $(name if name == $spec.name => {
                        return dispatch_request(&ctx, &$spec, arguments, session_key, user_agent, &|call| $handler(self, call, now), now);
                    })+
                    _ => {}
                }
            };
        }

        route![
            (ONBOARD_SPEC, handle_onboard),
            (IDENTITY_SPEC, handle_identity),
            (PROCESS_AGENT_UPDATE_SPEC, handle_process_agent_update),
            (SIMULATE_UPDATE_SPEC, handle_simulate_update),
            (GET_GOVERNANCE_METRICS_SPEC, handle_get_governance_metrics),
            (STORE_KNOWLEDGE_SPEC, handle_store_knowledge),
            (SEARCH_KNOWLEDGE_SPEC, handle_search_knowledge),
            (GET_DISCOVERY_DETAILS_SPEC, handle_get_discovery_details),
            (UPDATE_DISCOVERY_STATUS_GRAPH_SPEC, handle_update_discovery_status_graph),
            (LEAVE_NOTE_SPEC, handle_leave_note),
            (CLEANUP_KNOWLEDGE_GRAPH_SPEC, handle_cleanup_knowledge_graph),
            (REQUEST_DIALECTIC_REVIEW_SPEC, handle_request_dialectic_review),
            (SUBMIT_THESIS_SPEC, handle_submit_thesis),
            (SUBMIT_ANTITHESIS_SPEC, handle_submit_antithesis),
            (SUBMIT_SYNTHESIS_SPEC, handle_submit_synthesis),
            (GET_DIALECTIC_SESSION_SPEC, handle_get_dialectic_session),
            (LIST_DIALECTIC_SESSIONS_SPEC, handle_list_dialectic_sessions),
            (QUICK_RESUME_SPEC, handle_quick_resume),
            (SELF_RECOVERY_REVIEW_SPEC, handle_self_recovery_review),
            (CHECK_RECOVERY_OPTIONS_SPEC, handle_check_recovery_options),
            (OPERATOR_RESUME_AGENT_SPEC, handle_operator_resume_agent),
            (CALIBRATION_SPEC, handle_calibration),
            (CHECK_CALIBRATION_SPEC, handle_check_calibration),
            (REBUILD_CALIBRATION_SPEC, handle_rebuild_calibration),
            (UPDATE_CALIBRATION_GROUND_TRUTH_SPEC, handle_update_calibration_ground_truth),
            (BACKFILL_CALIBRATION_FROM_DIALECTIC_SPEC, handle_backfill_calibration_from_dialectic),
            (LIST_AGENTS_SPEC, handle_list_agents),
            (GET_AGENT_METADATA_SPEC, handle_get_agent_metadata),
            (UPDATE_AGENT_METADATA_SPEC, handle_update_agent_metadata),
            (ARCHIVE_AGENT_SPEC, handle_archive_agent),
            (RESUME_AGENT_SPEC, handle_resume_agent),
            (DELETE_AGENT_SPEC, handle_delete_agent),
            (PING_AGENT_SPEC, handle_ping_agent),
            (DETECT_STUCK_AGENTS_SPEC, handle_detect_stuck_agents),
            (HEALTH_CHECK_SPEC, handle_health_check),
            (GET_SERVER_INFO_SPEC, handle_get_server_info),
            (GET_TELEMETRY_METRICS_SPEC, handle_get_telemetry_metrics),
            (GET_TOOL_USAGE_STATS_SPEC, handle_get_tool_usage_stats),
            (CLEANUP_STALE_LOCKS_SPEC, handle_cleanup_stale_locks),
        ];

        unitares_dispatch::shape_error(&DispatchError::UnknownTool(tool_name.to_string()), None)
    }
}
