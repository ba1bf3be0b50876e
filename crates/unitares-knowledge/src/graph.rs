//! Discovery storage and graph traversal (spec.md §4.8, C8).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use unitares_store::{
    DiscoveryFilter, DiscoveryKind, DiscoveryRecord, DiscoveryStatus, EdgeRecord, EdgeType, Severity, UnitaresStore,
};

use crate::error::{KnowledgeError, KnowledgeResult};

/// Depth bound for chain-fetch and provenance walks, preventing runaway
/// traversal over cyclical or very deep edge graphs.
pub const MAX_CHAIN_DEPTH: usize = 20;

/// Input to [`store_discovery`]; `id`/`created_at`/`updated_at` are assigned by
/// the graph, not the caller.
#[derive(Debug, Clone)]
pub struct NewDiscovery {
    pub agent_id: String,
    pub kind: DiscoveryKind,
    pub severity: Severity,
    pub summary: String,
    pub details: String,
    pub tags: Vec<String>,
    pub confidence: Option<f64>,
    pub references_files: Vec<String>,
    pub provenance: Option<String>,
}

/// Writes one discovery, creating `has_tag` edges for each tag (spec.md §4.8
/// "Storage consists of discoveries, tags, and typed edges").
pub fn store_discovery(store: &UnitaresStore, input: NewDiscovery, now: DateTime<Utc>) -> KnowledgeResult<DiscoveryRecord> {
    let record = DiscoveryRecord {
        id: Uuid::new_v4(),
        agent_id: input.agent_id,
        kind: input.kind,
        severity: input.severity,
        status: DiscoveryStatus::Active,
        summary: input.summary,
        details: input.details,
        tags: input.tags.clone(),
        confidence: input.confidence,
        references_files: input.references_files,
        provenance: input.provenance,
        provenance_chain: Vec::new(),
        superseded_by: None,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };
    store.upsert_discovery(&record)?;

    for tag in &input.tags {
        store.add_edge(&EdgeRecord {
            id: Uuid::new_v4(),
            from_id: record.id.to_string(),
            to_id: tag.clone(),
            edge_type: EdgeType::HasTag,
            created_at: now,
        })?;
    }

    tracing::info!(discovery_id = %record.id, agent_id = %record.agent_id, "discovery stored");
    Ok(record)
}

/// Writes a batch of discoveries, continuing past individual failures and
/// returning every successfully stored record (spec.md §4.8 "single or batch").
pub fn store_discoveries_batch(
    store: &UnitaresStore,
    inputs: Vec<NewDiscovery>,
    now: DateTime<Utc>,
) -> Vec<KnowledgeResult<DiscoveryRecord>> {
    inputs.into_iter().map(|input| store_discovery(store, input, now)).collect()
}

/// A discovery together with discoveries reachable by following `response_to`
/// and `related_to` edges, up to [`MAX_CHAIN_DEPTH`].
#[derive(Debug, Clone)]
pub struct DiscoveryChain {
    pub root: DiscoveryRecord,
    pub chain: Vec<DiscoveryRecord>,
    pub truncated: bool,
}

/// Fetches a discovery with optional chain-fetch (spec.md §4.8 "follow
/// `response_to` and `related_to` up to a depth bound").
pub fn get_discovery_with_chain(store: &UnitaresStore, id: Uuid, follow_chain: bool) -> KnowledgeResult<DiscoveryChain> {
    let root = store.get_discovery(id)?.ok_or(KnowledgeError::NotFound(id))?;

    if !follow_chain {
        return Ok(DiscoveryChain { root, chain: Vec::new(), truncated: false });
    }

    let mut chain = Vec::new();
    let mut frontier = vec![id];
    let mut visited = std::collections::HashSet::from([id]);
    let mut truncated = false;

    for _ in 0..MAX_CHAIN_DEPTH {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();
        for node in frontier.drain(..) {
            let edges = store.edges_from(&node.to_string())?;
            for edge in edges {
                if !matches!(edge.edge_type, EdgeType::ResponseTo | EdgeType::RelatedTo) {
                    continue;
                }
                let Ok(to_id) = Uuid::parse_str(&edge.to_id) else { continue };
                if visited.contains(&to_id) {
                    continue;
                }
                if let Some(discovery) = store.get_discovery(to_id)? {
                    visited.insert(to_id);
                    chain.push(discovery);
                    next_frontier.push(to_id);
                }
            }
        }
        frontier = next_frontier;
    }
    if !frontier.is_empty() {
        truncated = true;
    }

    Ok(DiscoveryChain { root, chain, truncated })
}

/// Walks `spawned`/authoring lineage backward from `agent_id` to its
/// ancestors (spec.md §4.8 "provenance fetch... walk `spawned`/authoring
/// lineage").
pub fn provenance_lineage(store: &UnitaresStore, agent_id: &str) -> KnowledgeResult<Vec<String>> {
    let mut lineage = Vec::new();
    let mut current = agent_id.to_string();
    let mut visited = std::collections::HashSet::new();
    visited.insert(current.clone());

    for _ in 0..MAX_CHAIN_DEPTH {
        let edges = store.edges_from(&current)?;
        let parent = edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Spawned && e.to_id == current)
            .map(|e| e.from_id.clone());
        match parent {
            Some(parent_id) if !visited.contains(&parent_id) => {
                visited.insert(parent_id.clone());
                lineage.push(parent_id.clone());
                current = parent_id;
            }
            _ => break,
        }
    }
    Ok(lineage)
}

/// Field-level update; only `Some` fields are applied. `append_details`, when
/// set, appends to existing details instead of replacing them (spec.md §4.8
/// "supports append-mode for details").
#[derive(Debug, Clone, Default)]
pub struct DiscoveryUpdate {
    pub summary: Option<String>,
    pub details: Option<String>,
    pub append_details: Option<String>,
    pub tags: Option<Vec<String>>,
    pub severity: Option<Severity>,
}

pub fn update_discovery(
    store: &UnitaresStore,
    id: Uuid,
    requesting_agent_id: &str,
    update: DiscoveryUpdate,
    now: DateTime<Utc>,
) -> KnowledgeResult<DiscoveryRecord> {
    let mut record = store.get_discovery(id)?.ok_or(KnowledgeError::NotFound(id))?;
    if record.agent_id != requesting_agent_id {
        return Err(KnowledgeError::NotOwner {
            owner: record.agent_id.clone(),
            actual: requesting_agent_id.to_string(),
        });
    }

    if let Some(summary) = update.summary {
        record.summary = summary;
    }
    if let Some(details) = update.details {
        record.details = details;
    }
    if let Some(appended) = update.append_details {
        record.details.push('\n');
        record.details.push_str(&appended);
    }
    if let Some(tags) = update.tags {
        record.tags = tags;
    }
    if let Some(severity) = update.severity {
        record.severity = severity;
    }
    record.updated_at = now;

    store.upsert_discovery(&record)?;
    Ok(record)
}

/// Applies a status transition (spec.md §4.8 "active→resolved→archived, or
/// ←superseded with a pointer").
pub fn update_status(
    store: &UnitaresStore,
    id: Uuid,
    new_status: DiscoveryStatus,
    superseded_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> KnowledgeResult<DiscoveryRecord> {
    let mut record = store.get_discovery(id)?.ok_or(KnowledgeError::NotFound(id))?;

    let allowed = matches!(
        (record.status, new_status),
        (DiscoveryStatus::Active, DiscoveryStatus::Resolved)
            | (DiscoveryStatus::Active, DiscoveryStatus::Open)
            | (DiscoveryStatus::Open, DiscoveryStatus::Resolved)
            | (DiscoveryStatus::Resolved, DiscoveryStatus::Archived)
            | (_, DiscoveryStatus::Superseded)
    );
    if !allowed {
        return Err(KnowledgeError::InvalidTransition {
            from: format!("{:?}", record.status),
            to: format!("{:?}", new_status),
        });
    }
    if new_status == DiscoveryStatus::Superseded && superseded_by.is_none() {
        return Err(KnowledgeError::MissingSupersededBy);
    }

    record.status = new_status;
    record.superseded_by = superseded_by;
    if new_status == DiscoveryStatus::Resolved {
        record.resolved_at = Some(now);
    }
    record.updated_at = now;

    store.upsert_discovery(&record)?;
    tracing::info!(discovery_id = %id, status = ?new_status, "discovery status updated");
    Ok(record)
}

pub fn add_tag(store: &UnitaresStore, id: Uuid, tag: String, now: DateTime<Utc>) -> KnowledgeResult<DiscoveryRecord> {
    let mut record = store.get_discovery(id)?.ok_or(KnowledgeError::NotFound(id))?;
    if !record.tags.contains(&tag) {
        record.tags.push(tag.clone());
        record.updated_at = now;
        store.upsert_discovery(&record)?;
        store.add_edge(&EdgeRecord {
            id: Uuid::new_v4(),
            from_id: id.to_string(),
            to_id: tag,
            edge_type: EdgeType::HasTag,
            created_at: now,
        })?;
    }
    Ok(record)
}

/// Creates a `related_to` edge between two discoveries (spec.md §4.8
/// `link_related(src, dst, type)`).
pub fn link_related(store: &UnitaresStore, src: Uuid, dst: Uuid, edge_type: EdgeType, now: DateTime<Utc>) -> KnowledgeResult<()> {
    store.add_edge(&EdgeRecord {
        id: Uuid::new_v4(),
        from_id: src.to_string(),
        to_id: dst.to_string(),
        edge_type,
        created_at: now,
    })?;
    Ok(())
}

/// Outcome of a [`lifecycle_cleanup`] pass.
#[derive(Debug, Clone, Default)]
pub struct LifecycleCleanupReport {
    pub archived: Vec<Uuid>,
    pub dry_run: bool,
}

/// Archives `resolved` discoveries older than `max_age_days` (spec.md §4.8
/// `lifecycle_cleanup(dry_run)` "archives stale records per policy"). With
/// `dry_run`, computes the set that would be archived without writing.
pub fn lifecycle_cleanup(
    store: &UnitaresStore,
    max_age_days: i64,
    now: DateTime<Utc>,
    dry_run: bool,
) -> KnowledgeResult<LifecycleCleanupReport> {
    let candidates = store.query_discoveries(&DiscoveryFilter {
        status: Some(DiscoveryStatus::Resolved),
        ..Default::default()
    })?;

    let mut archived = Vec::new();
    for mut record in candidates {
        let resolved_at = record.resolved_at.unwrap_or(record.updated_at);
        if now.signed_duration_since(resolved_at).num_days() < max_age_days {
            continue;
        }
        archived.push(record.id);
        if !dry_run {
            record.status = DiscoveryStatus::Archived;
            record.updated_at = now;
            store.upsert_discovery(&record)?;
        }
    }

    if !dry_run {
        tracing::info!(count = archived.len(), "lifecycle cleanup archived stale discoveries");
    }
    Ok(LifecycleCleanupReport { archived, dry_run })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> UnitaresStore {
        UnitaresStore::open_temporary().unwrap()
    }

    fn sample(agent_id: &str) -> NewDiscovery {
        NewDiscovery {
            agent_id: agent_id.to_string(),
            kind: DiscoveryKind::BugFound,
            severity: Severity::Medium,
            summary: "Off-by-one in pagination".to_string(),
            details: "Page 2 skips the first row".to_string(),
            tags: vec!["pagination".to_string()],
            confidence: Some(0.9),
            references_files: vec!["src/pagination.rs".to_string()],
            provenance: None,
        }
    }

    #[test]
    fn store_and_fetch_roundtrip() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now).unwrap();

        let fetched = get_discovery_with_chain(&store, record.id, false).unwrap();
        assert_eq!(fetched.root.summary, "Off-by-one in pagination");
        assert!(fetched.chain.is_empty());
    }

    #[test]
    fn chain_fetch_follows_related_to() {
        let store = store();
        let now = Utc::now();
        let a = store_discovery(&store, sample("agent-1"), now).unwrap();
        let b = store_discovery(&store, sample("agent-1"), now).unwrap();
        link_related(&store, a.id, b.id, EdgeType::RelatedTo, now).unwrap();

        let chain = get_discovery_with_chain(&store, a.id, true).unwrap();
        assert_eq!(chain.chain.len(), 1);
        assert_eq!(chain.chain[0].id, b.id);
        assert!(!chain.truncated);
    }

    #[test]
    fn update_rejects_non_owner() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now).unwrap();

        let result = update_discovery(
            &store,
            record.id,
            "agent-2",
            DiscoveryUpdate { summary: Some("hijacked".to_string()), ..Default::default() },
            now,
        );
        assert!(matches!(result, Err(KnowledgeError::NotOwner { .. })));
    }

    #[test]
    fn append_details_extends_existing_text() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now).unwrap();

        let updated = update_discovery(
            &store,
            record.id,
            "agent-1",
            DiscoveryUpdate { append_details: Some("Confirmed on staging.".to_string()), ..Default::default() },
            now,
        )
        .unwrap();
        assert!(updated.details.contains("Page 2 skips the first row"));
        assert!(updated.details.contains("Confirmed on staging."));
    }

    #[test]
    fn status_transition_active_to_resolved_sets_timestamp() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now).unwrap();

        let resolved = update_status(&store, record.id, DiscoveryStatus::Resolved, None, now).unwrap();
        assert_eq!(resolved.status, DiscoveryStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[test]
    fn superseded_requires_pointer() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now).unwrap();

        let result = update_status(&store, record.id, DiscoveryStatus::Superseded, None, now);
        assert!(matches!(result, Err(KnowledgeError::MissingSupersededBy)));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now).unwrap();
        let archived = update_status(&store, record.id, DiscoveryStatus::Archived, None, now);
        assert!(matches!(archived, Err(KnowledgeError::InvalidTransition { .. })));
    }

    #[test]
    fn lifecycle_cleanup_archives_stale_resolved_discoveries() {
        let store = store();
        let now = Utc::now();
        let record = store_discovery(&store, sample("agent-1"), now - chrono::Duration::days(40)).unwrap();
        update_status(&store, record.id, DiscoveryStatus::Resolved, None, now - chrono::Duration::days(35)).unwrap();

        let dry = lifecycle_cleanup(&store, 30, now, true).unwrap();
        assert_eq!(dry.archived, vec![record.id]);
        let still_resolved = store.get_discovery(record.id).unwrap().unwrap();
        assert_eq!(still_resolved.status, DiscoveryStatus::Resolved);

        let real = lifecycle_cleanup(&store, 30, now, false).unwrap();
        assert_eq!(real.archived, vec![record.id]);
        let archived = store.get_discovery(record.id).unwrap().unwrap();
        assert_eq!(archived.status, DiscoveryStatus::Archived);
    }
}
