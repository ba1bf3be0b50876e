//! Persisted record shapes for the schema-versioned storage layer (spec.md §4.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unitares_core::{eisv::AgentState, IdentityStatus};
use uuid::Uuid;

/// Schema version written alongside the database; bump when a record shape changes
/// in a way that is not backward compatible.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub agent_uuid: Uuid,
    pub agent_id: String,
    pub status: IdentityStatus,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_key: String,
    pub agent_uuid: Uuid,
    pub agent_id: String,
    pub client_session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateRecord {
    pub agent_uuid: Uuid,
    pub state: AgentState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventRecord {
    pub id: Uuid,
    pub agent_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    BugFound,
    Insight,
    Pattern,
    Improvement,
    Question,
    Note,
    ArchitecturalDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Active,
    Open,
    Resolved,
    Superseded,
    Archived,
}

/// A single entry in the shared knowledge graph (spec.md §3 "Discovery").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub id: Uuid,
    pub agent_id: String,
    pub kind: DiscoveryKind,
    pub severity: Severity,
    pub status: DiscoveryStatus,
    pub summary: String,
    pub details: String,
    pub tags: Vec<String>,
    pub confidence: Option<f64>,
    pub references_files: Vec<String>,
    pub provenance: Option<String>,
    pub provenance_chain: Vec<String>,
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    ResponseTo,
    RelatedTo,
    HasTag,
    Spawned,
    AboutDiscovery,
    HasMessage,
    PausedAgent,
    Reviewer,
    Wrote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: Uuid,
    pub from_id: String,
    pub to_id: String,
    pub edge_type: EdgeType,
    pub created_at: DateTime<Utc>,
}

/// A dialectic session pairs a paused agent with an (optional) reviewer
/// (spec.md §4.9). `phase`/`status`/`dispute_type`/`session_type`/`action` are
/// stored as strings since the state-machine semantics live in
/// `unitares-dialectic`, not the storage layer. `status` tracks the overall
/// outcome (`active|converged|failed|canceled`) and is distinct from `phase`,
/// which tracks the current step of the thesis/antithesis/synthesis cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialecticSessionRecord {
    pub id: Uuid,
    pub paused_agent_id: String,
    pub reviewer_id: Option<String>,
    pub phase: String,
    pub status: String,
    pub session_type: String,
    pub topic: Option<String>,
    pub reason: Option<String>,
    pub discovery_id: Option<Uuid>,
    pub dispute_type: Option<String>,
    pub synthesis_round: u32,
    pub excluded_reviewer_ids: Vec<String>,
    pub resolution_action: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialecticMessageRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub seq: u32,
    pub agent_id: String,
    pub message_type: String,
    pub content: serde_json::Value,
    /// Reviewer/agent signature over the message content, when the transport
    /// supplied one (spec.md §3 dialectic message tuple's `signature?`).
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sort order for query results (spec.md §4.1 "Query results are ordered by
/// `timestamp ASC` by default; a `DESC` option exists").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Asc
    }
}

/// Filters accepted by `query_audit_events` (spec.md §4.1 "Operations consumed by the core").
#[derive(Debug, Clone, Default)]
pub struct AuditEventFilter {
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub order: SortOrder,
}

/// Filters accepted by `query_discoveries`.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub agent_id: Option<String>,
    pub kind: Option<DiscoveryKind>,
    pub severity: Option<Severity>,
    pub status: Option<DiscoveryStatus>,
    pub tag: Option<String>,
    pub text: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub order: SortOrder,
}

/// Filters accepted by `query_dialectic_sessions` (spec.md §6 `list_dialectic_sessions`).
#[derive(Debug, Clone, Default)]
pub struct DialecticSessionFilter {
    pub agent_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Result of the store's health probe (spec.md §4.1 "health probe").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProbe {
    pub backend: String,
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub counts: HashMap<String, u64>,
    pub fts_enabled: bool,
}
