//! Sled-backed implementation of the UNITARES persistence layer (spec.md §4.1, C1).
//!
//! One sled tree per entity kind, grounded in the teacher's `KnowledgeStore`
//! (`examples/c04ch1337-pagi-xcurzens/crates/pagi-core/src/knowledge/store.rs`):
//! `db.open_tree(name)` per logical namespace, JSON-serialized values, `tracing`
//! on writes. Audit events additionally get a content-hash index tree for
//! idempotent appends.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use sled::Db;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::records::*;

const TREE_IDENTITIES: &str = "identities";
const TREE_IDENTITIES_BY_AGENT_ID: &str = "identities_by_agent_id";
const TREE_SESSIONS: &str = "sessions";
const TREE_AGENT_STATE: &str = "agent_state";
const TREE_AUDIT: &str = "audit_events";
const TREE_AUDIT_HASHES: &str = "audit_event_hashes";
const TREE_DISCOVERIES: &str = "discoveries";
const TREE_EDGES: &str = "edges";
const TREE_DIALECTIC_SESSIONS: &str = "dialectic_sessions";
const TREE_DIALECTIC_MESSAGES: &str = "dialectic_messages";
const TREE_META: &str = "meta";

const META_SCHEMA_VERSION_KEY: &str = "schema_version";

/// Backend-agnostic persistence layer. Currently sled-only; the `StorageBackend`
/// trait shape (see `lib.rs`) is the seam a future Postgres-primary implementation
/// would plug into.
pub struct UnitaresStore {
    db: Db,
}

fn to_bytes<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

impl UnitaresStore {
    /// Opens (or creates) the store at `path`, writing the schema version on first use.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = sled::open(path)?;
        let store = Self { db };
        store.ensure_schema()?;
        Ok(store)
    }

    /// In-memory store for tests and the demo binary.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let store = Self { db };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> StoreResult<()> {
        let meta = self.db.open_tree(TREE_META)?;
        match meta.get(META_SCHEMA_VERSION_KEY)? {
            None => {
                meta.insert(META_SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_be_bytes())?;
                Ok(())
            }
            Some(raw) => {
                let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| {
                    StoreError::SchemaVersionMismatch { found: 0, expected: SCHEMA_VERSION }
                })?;
                let found = u32::from_be_bytes(bytes);
                if found != SCHEMA_VERSION {
                    return Err(StoreError::SchemaVersionMismatch { found, expected: SCHEMA_VERSION });
                }
                Ok(())
            }
        }
    }

    // ---- Identities (spec.md §4.1, §4.2) ----

    pub fn upsert_identity(&self, record: &IdentityRecord) -> StoreResult<()> {
        let identities = self.db.open_tree(TREE_IDENTITIES)?;
        let by_agent_id = self.db.open_tree(TREE_IDENTITIES_BY_AGENT_ID)?;
        identities.insert(record.agent_uuid.as_bytes(), to_bytes(record)?)?;
        by_agent_id.insert(record.agent_id.as_bytes(), record.agent_uuid.as_bytes())?;
        tracing::debug!(agent_uuid = %record.agent_uuid, agent_id = %record.agent_id, "identity upserted");
        Ok(())
    }

    pub fn get_identity_by_uuid(&self, agent_uuid: Uuid) -> StoreResult<Option<IdentityRecord>> {
        let identities = self.db.open_tree(TREE_IDENTITIES)?;
        match identities.get(agent_uuid.as_bytes())? {
            Some(raw) => Ok(Some(from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_identity_by_agent_id(&self, agent_id: &str) -> StoreResult<Option<IdentityRecord>> {
        let by_agent_id = self.db.open_tree(TREE_IDENTITIES_BY_AGENT_ID)?;
        let Some(uuid_bytes) = by_agent_id.get(agent_id.as_bytes())? else {
            return Ok(None);
        };
        let uuid = Uuid::from_slice(&uuid_bytes).map_err(|_| {
            StoreError::IdentityAmbiguous(agent_id.to_string())
        })?;
        self.get_identity_by_uuid(uuid)
    }

    pub fn get_identity_by_session(&self, client_session_id: &str) -> StoreResult<Option<IdentityRecord>> {
        let Some(session) = self.get_session_by_client_session_id(client_session_id)? else {
            return Ok(None);
        };
        self.get_identity_by_uuid(session.agent_uuid)
    }

    /// Lists every identity currently `active` (spec.md §4.9 "Reviewer selection...
    /// pool of active identities").
    pub fn list_active_identities(&self) -> StoreResult<Vec<IdentityRecord>> {
        let identities = self.db.open_tree(TREE_IDENTITIES)?;
        let mut out = Vec::new();
        for item in identities.iter() {
            let (_, raw) = item?;
            let record: IdentityRecord = from_bytes(&raw)?;
            if record.status == IdentityStatus::Active {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Lists every identity regardless of status (spec.md §6 `list_agents`).
    pub fn list_all_identities(&self) -> StoreResult<Vec<IdentityRecord>> {
        let identities = self.db.open_tree(TREE_IDENTITIES)?;
        let mut out = Vec::new();
        for item in identities.iter() {
            let (_, raw) = item?;
            out.push(from_bytes(&raw)?);
        }
        Ok(out)
    }

    // ---- Sessions (spec.md §4.2) ----

    pub fn create_session(&self, record: &SessionRecord) -> StoreResult<()> {
        let sessions = self.db.open_tree(TREE_SESSIONS)?;
        sessions.insert(record.session_key.as_bytes(), to_bytes(record)?)?;
        tracing::debug!(session_key = %record.session_key, agent_uuid = %record.agent_uuid, "session created");
        Ok(())
    }

    pub fn refresh_session(&self, session_key: &str, new_expiry: DateTime<Utc>) -> StoreResult<()> {
        let sessions = self.db.open_tree(TREE_SESSIONS)?;
        let Some(raw) = sessions.get(session_key.as_bytes())? else {
            return Err(StoreError::SessionNotFound(session_key.to_string()));
        };
        let mut record: SessionRecord = from_bytes(&raw)?;
        record.expires_at = new_expiry;
        sessions.insert(session_key.as_bytes(), to_bytes(&record)?)?;
        Ok(())
    }

    pub fn expire_session(&self, session_key: &str) -> StoreResult<()> {
        let sessions = self.db.open_tree(TREE_SESSIONS)?;
        sessions.remove(session_key.as_bytes())?;
        Ok(())
    }

    pub fn get_session(&self, session_key: &str) -> StoreResult<Option<SessionRecord>> {
        let sessions = self.db.open_tree(TREE_SESSIONS)?;
        match sessions.get(session_key.as_bytes())? {
            Some(raw) => Ok(Some(from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    fn get_session_by_client_session_id(&self, client_session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let sessions = self.db.open_tree(TREE_SESSIONS)?;
        for item in sessions.iter() {
            let (_, raw) = item?;
            let record: SessionRecord = from_bytes(&raw)?;
            if record.client_session_id == client_session_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    // ---- Agent state snapshots (spec.md §4.1, §4.4) ----

    pub fn upsert_agent_state(&self, record: &AgentStateRecord) -> StoreResult<()> {
        let tree = self.db.open_tree(TREE_AGENT_STATE)?;
        tree.insert(record.agent_uuid.as_bytes(), to_bytes(record)?)?;
        Ok(())
    }

    pub fn get_agent_state(&self, agent_uuid: Uuid) -> StoreResult<Option<AgentStateRecord>> {
        let tree = self.db.open_tree(TREE_AGENT_STATE)?;
        match tree.get(agent_uuid.as_bytes())? {
            Some(raw) => Ok(Some(from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    // ---- Audit events (spec.md §4.1 "partitioned by day", content-hash dedup) ----

    /// Computes the content hash used for idempotent audit appends.
    pub fn audit_content_hash(agent_id: &str, event_type: &str, payload: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(agent_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(event_type.as_bytes());
        hasher.update(b"\0");
        hasher.update(payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Appends an audit event, partitioned by UTC day in the key. Idempotent under
    /// the supplied content hash: a repeat append returns the existing record.
    pub fn append_audit_event(
        &self,
        agent_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<AuditEventRecord> {
        let content_hash = Self::audit_content_hash(agent_id, event_type, &payload);
        let hashes = self.db.open_tree(TREE_AUDIT_HASHES)?;
        if let Some(existing_id) = hashes.get(content_hash.as_bytes())? {
            let audit = self.db.open_tree(TREE_AUDIT)?;
            if let Some(raw) = audit.get(existing_id.as_ref())? {
                return Ok(from_bytes(&raw)?);
            }
        }

        let record = AuditEventRecord {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            event_type: event_type.to_string(),
            timestamp: now,
            content_hash: content_hash.clone(),
            payload,
        };

        let partition = now.format("%Y%m%d").to_string();
        let key = format!("{partition}/{}/{}", now.timestamp_nanos_opt().unwrap_or(0), record.id);

        let audit = self.db.open_tree(TREE_AUDIT)?;
        audit.insert(key.as_bytes(), to_bytes(&record)?)?;
        hashes.insert(content_hash.as_bytes(), record.id.as_bytes())?;
        tracing::debug!(agent_id, event_type, partition = %partition, "audit event appended");
        Ok(record)
    }

    /// Queries audit events by filter set. Partitions with no matching rows are
    /// counted as *skipped*, not an error (spec.md §4.1).
    pub fn query_audit_events(&self, filter: &AuditEventFilter) -> StoreResult<Vec<AuditEventRecord>> {
        let audit = self.db.open_tree(TREE_AUDIT)?;
        let mut out = Vec::new();
        for item in audit.iter() {
            let (_, raw) = item?;
            let record: AuditEventRecord = from_bytes(&raw)?;

            if let Some(agent_id) = &filter.agent_id {
                if &record.agent_id != agent_id {
                    continue;
                }
            }
            if let Some(event_type) = &filter.event_type {
                if &record.event_type != event_type {
                    continue;
                }
            }
            if let Some(start) = filter.start {
                if record.timestamp < start {
                    continue;
                }
            }
            if let Some(end) = filter.end {
                if record.timestamp > end {
                    continue;
                }
            }
            if let Some(text) = &filter.text {
                let haystack = record.payload.to_string().to_lowercase();
                if !haystack.contains(&text.to_lowercase()) {
                    continue;
                }
            }
            out.push(record);
        }
        out.sort_by_key(|r| r.timestamp);
        if filter.order == SortOrder::Desc {
            out.reverse();
        }
        Ok(out)
    }

    // ---- Knowledge graph (spec.md §4.1, §4.8) ----

    /// Writes a discovery and its tags together; tags live embedded in the record
    /// so the write is atomic per the "mixed multi-entity writes commit together"
    /// contract without needing a cross-tree transaction.
    pub fn upsert_discovery(&self, record: &DiscoveryRecord) -> StoreResult<()> {
        let tree = self.db.open_tree(TREE_DISCOVERIES)?;
        tree.insert(record.id.as_bytes(), to_bytes(record)?)?;
        Ok(())
    }

    pub fn get_discovery(&self, id: Uuid) -> StoreResult<Option<DiscoveryRecord>> {
        let tree = self.db.open_tree(TREE_DISCOVERIES)?;
        match tree.get(id.as_bytes())? {
            Some(raw) => Ok(Some(from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn query_discoveries(&self, filter: &DiscoveryFilter) -> StoreResult<Vec<DiscoveryRecord>> {
        let tree = self.db.open_tree(TREE_DISCOVERIES)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, raw) = item?;
            let record: DiscoveryRecord = from_bytes(&raw)?;

            if let Some(agent_id) = &filter.agent_id {
                if &record.agent_id != agent_id {
                    continue;
                }
            }
            if let Some(kind) = filter.kind {
                if record.kind != kind {
                    continue;
                }
            }
            if let Some(severity) = filter.severity {
                if record.severity != severity {
                    continue;
                }
            }
            if let Some(status) = filter.status {
                if record.status != status {
                    continue;
                }
            }
            if let Some(tag) = &filter.tag {
                if !record.tags.iter().any(|t| t == tag) {
                    continue;
                }
            }
            if let Some(start) = filter.start {
                if record.created_at < start {
                    continue;
                }
            }
            if let Some(end) = filter.end {
                if record.created_at > end {
                    continue;
                }
            }
            if let Some(text) = &filter.text {
                let lower_text = text.to_lowercase();
                if !record.summary.to_lowercase().contains(&lower_text)
                    && !record.details.to_lowercase().contains(&lower_text)
                    && !record.tags.iter().any(|t| t.to_lowercase().contains(&lower_text))
                {
                    continue;
                }
            }
            out.push(record);
        }
        out.sort_by_key(|r| r.created_at);
        if filter.order == SortOrder::Desc {
            out.reverse();
        }
        Ok(out)
    }

    pub fn add_edge(&self, record: &EdgeRecord) -> StoreResult<()> {
        let tree = self.db.open_tree(TREE_EDGES)?;
        tree.insert(record.id.as_bytes(), to_bytes(record)?)?;
        Ok(())
    }

    pub fn edges_from(&self, from_id: &str) -> StoreResult<Vec<EdgeRecord>> {
        let tree = self.db.open_tree(TREE_EDGES)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, raw) = item?;
            let record: EdgeRecord = from_bytes(&raw)?;
            if record.from_id == from_id {
                out.push(record);
            }
        }
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    // ---- Dialectic (spec.md §4.1, §4.9) ----

    pub fn upsert_dialectic_session(&self, record: &DialecticSessionRecord) -> StoreResult<()> {
        let tree = self.db.open_tree(TREE_DIALECTIC_SESSIONS)?;
        tree.insert(record.id.as_bytes(), to_bytes(record)?)?;
        Ok(())
    }

    pub fn get_dialectic_session(&self, id: Uuid) -> StoreResult<Option<DialecticSessionRecord>> {
        let tree = self.db.open_tree(TREE_DIALECTIC_SESSIONS)?;
        match tree.get(id.as_bytes())? {
            Some(raw) => Ok(Some(from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn append_dialectic_message(&self, record: &DialecticMessageRecord) -> StoreResult<()> {
        let tree = self.db.open_tree(TREE_DIALECTIC_MESSAGES)?;
        let key = format!("{}/{}", record.session_id, record.id);
        tree.insert(key.as_bytes(), to_bytes(record)?)?;
        Ok(())
    }

    pub fn list_dialectic_messages(&self, session_id: Uuid) -> StoreResult<Vec<DialecticMessageRecord>> {
        let tree = self.db.open_tree(TREE_DIALECTIC_MESSAGES)?;
        let prefix = format!("{session_id}/");
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            out.push(from_bytes(&raw)?);
        }
        out.sort_by_key(|r: &DialecticMessageRecord| r.created_at);
        Ok(out)
    }

    pub fn list_active_dialectic_sessions(&self) -> StoreResult<Vec<DialecticSessionRecord>> {
        let tree = self.db.open_tree(TREE_DIALECTIC_SESSIONS)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, raw) = item?;
            let record: DialecticSessionRecord = from_bytes(&raw)?;
            if record.active {
                out.push(record);
            }
        }
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    /// Filtered, historical dialectic session query (spec.md §6
    /// `list_dialectic_sessions(agent_id?, status?, limit?, include_transcript?)`):
    /// unlike `list_active_dialectic_sessions`, this also returns resolved/failed/
    /// canceled sessions, most recently updated first, bounded by `limit`.
    pub fn query_dialectic_sessions(&self, filter: &DialecticSessionFilter) -> StoreResult<Vec<DialecticSessionRecord>> {
        let tree = self.db.open_tree(TREE_DIALECTIC_SESSIONS)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, raw) = item?;
            let record: DialecticSessionRecord = from_bytes(&raw)?;

            if let Some(agent_id) = &filter.agent_id {
                if &record.paused_agent_id != agent_id && record.reviewer_id.as_ref() != Some(agent_id) {
                    continue;
                }
            }
            if let Some(status) = &filter.status {
                if &record.status != status {
                    continue;
                }
            }
            out.push(record);
        }
        out.sort_by_key(|r| std::cmp::Reverse(r.updated_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    // ---- Health probe (spec.md §4.1) ----

    pub fn health_probe(&self) -> StoreResult<HealthProbe> {
        let mut counts = HashMap::new();
        counts.insert("identities".to_string(), self.db.open_tree(TREE_IDENTITIES)?.len() as u64);
        counts.insert("sessions".to_string(), self.db.open_tree(TREE_SESSIONS)?.len() as u64);
        counts.insert("agent_state".to_string(), self.db.open_tree(TREE_AGENT_STATE)?.len() as u64);
        counts.insert("audit_events".to_string(), self.db.open_tree(TREE_AUDIT)?.len() as u64);
        counts.insert("discoveries".to_string(), self.db.open_tree(TREE_DISCOVERIES)?.len() as u64);
        counts.insert("edges".to_string(), self.db.open_tree(TREE_EDGES)?.len() as u64);
        counts.insert(
            "dialectic_sessions".to_string(),
            self.db.open_tree(TREE_DIALECTIC_SESSIONS)?.len() as u64,
        );

        let integrity_ok = self.db.verify_integrity().is_ok();

        Ok(HealthProbe {
            backend: "sled".to_string(),
            schema_version: SCHEMA_VERSION,
            integrity_ok,
            counts,
            fts_enabled: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> UnitaresStore {
        UnitaresStore::open_temporary().unwrap()
    }

    #[test]
    fn identity_round_trips_by_uuid_and_agent_id() {
        let store = store();
        let now = Utc::now();
        let record = IdentityRecord {
            agent_uuid: Uuid::new_v4(),
            agent_id: "claude_20260728".to_string(),
            status: unitares_core::IdentityStatus::Active,
            created_at: now,
            last_seen_at: now,
            paused_at: None,
        };
        store.upsert_identity(&record).unwrap();

        let by_uuid = store.get_identity_by_uuid(record.agent_uuid).unwrap().unwrap();
        assert_eq!(by_uuid.agent_id, record.agent_id);

        let by_agent_id = store.get_identity_by_agent_id(&record.agent_id).unwrap().unwrap();
        assert_eq!(by_agent_id.agent_uuid, record.agent_uuid);
    }

    #[test]
    fn audit_append_is_idempotent_under_content_hash() {
        let store = store();
        let now = Utc::now();
        let payload = serde_json::json!({"tool": "store_knowledge", "ok": true});
        let first = store.append_audit_event("agent-1", "tool_call", payload.clone(), now).unwrap();
        let second = store.append_audit_event("agent-1", "tool_call", payload, now).unwrap();
        assert_eq!(first.id, second.id);

        let all = store
            .query_audit_events(&AuditEventFilter { agent_id: Some("agent-1".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn query_audit_events_orders_and_filters() {
        let store = store();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        store
            .append_audit_event("agent-1", "check_in", serde_json::json!({"n": 1}), t0)
            .unwrap();
        store
            .append_audit_event("agent-1", "check_in", serde_json::json!({"n": 2}), t1)
            .unwrap();

        let asc = store
            .query_audit_events(&AuditEventFilter { agent_id: Some("agent-1".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(asc.len(), 2);
        assert!(asc[0].timestamp <= asc[1].timestamp);

        let desc = store
            .query_audit_events(&AuditEventFilter {
                agent_id: Some("agent-1".to_string()),
                order: SortOrder::Desc,
                ..Default::default()
            })
            .unwrap();
        assert!(desc[0].timestamp >= desc[1].timestamp);
    }

    #[test]
    fn discovery_filter_by_tag_and_text() {
        let store = store();
        let now = Utc::now();
        let record = DiscoveryRecord {
            id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            kind: crate::records::DiscoveryKind::BugFound,
            severity: crate::records::Severity::High,
            status: crate::records::DiscoveryStatus::Open,
            summary: "Rate limiter bypass".to_string(),
            details: "Found a bypass in the token bucket".to_string(),
            tags: vec!["security".to_string()],
            confidence: Some(0.8),
            references_files: vec![],
            provenance: None,
            provenance_chain: vec![],
            superseded_by: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        store.upsert_discovery(&record).unwrap();

        let by_tag = store
            .query_discoveries(&DiscoveryFilter { tag: Some("security".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(by_tag.len(), 1);

        let by_text = store
            .query_discoveries(&DiscoveryFilter { text: Some("bypass".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(by_text.len(), 1);

        let miss = store
            .query_discoveries(&DiscoveryFilter { tag: Some("performance".to_string()), ..Default::default() })
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn health_probe_reports_counts_and_schema_version() {
        let store = store();
        let probe = store.health_probe().unwrap();
        assert_eq!(probe.backend, "sled");
        assert_eq!(probe.schema_version, SCHEMA_VERSION);
        assert!(probe.integrity_ok);
    }

    #[test]
    fn dialectic_messages_list_in_order_per_session() {
        let store = store();
        let session_id = Uuid::new_v4();
        let t0 = Utc::now();
        store
            .append_dialectic_message(&DialecticMessageRecord {
                id: Uuid::new_v4(),
                session_id,
                seq: 0,
                agent_id: "agent-1".to_string(),
                message_type: "thesis".to_string(),
                content: serde_json::json!({"text": "first"}),
                signature: None,
                created_at: t0,
            })
            .unwrap();
        store
            .append_dialectic_message(&DialecticMessageRecord {
                id: Uuid::new_v4(),
                session_id,
                seq: 1,
                agent_id: "agent-2".to_string(),
                message_type: "antithesis".to_string(),
                content: serde_json::json!({"text": "second"}),
                signature: None,
                created_at: t0 + chrono::Duration::seconds(5),
            })
            .unwrap();

        let messages = store.list_dialectic_messages(session_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content["text"], "first");
        assert_eq!(messages[1].content["text"], "second");
    }
}
