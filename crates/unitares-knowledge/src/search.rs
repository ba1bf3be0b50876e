//! Lexical search and ranking over the knowledge graph (spec.md §4.8
//! "Ranking contract", "FTS").

use chrono::{DateTime, Utc};
use uuid::Uuid;

use unitares_store::{DiscoveryFilter, DiscoveryKind, DiscoveryRecord, DiscoveryStatus, Severity, UnitaresStore};

use crate::error::KnowledgeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    CreatedAt,
    Relevance,
    Score,
    RelatedCount,
}

/// Search parameters (spec.md §4.8 `search`: "tag filter, type/severity/status/
/// agent filter, date range, FTS query, sort by ..., limit").
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub agent_id: Option<String>,
    pub kind: Option<DiscoveryKind>,
    pub severity: Option<Severity>,
    pub status: Option<DiscoveryStatus>,
    pub tag: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub query: Option<String>,
    pub sort_by: Option<SortBy>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ScoredDiscovery {
    pub discovery: DiscoveryRecord,
    pub score: f64,
    pub related_count: usize,
}

/// Runs `search` against the store. When `sort_by == Relevance` without a
/// `query`, falls back to `created_at` ordering (spec.md requires `query` for
/// relevance sort; treat its absence as a degrade rather than an error).
pub fn search(store: &UnitaresStore, params: &SearchParams) -> KnowledgeResult<Vec<ScoredDiscovery>> {
    let filter = DiscoveryFilter {
        agent_id: params.agent_id.clone(),
        kind: params.kind,
        severity: params.severity,
        status: params.status,
        tag: params.tag.clone(),
        text: params.query.clone(),
        start: params.start,
        end: params.end,
        ..Default::default()
    };
    let results = store.query_discoveries(&filter)?;

    let now = Utc::now();
    let mut scored: Vec<ScoredDiscovery> = results
        .into_iter()
        .map(|discovery| {
            let related_count = count_related(store, discovery.id).unwrap_or(0);
            let score = relevance_score(&discovery, params.query.as_deref(), params.tag.as_deref(), now);
            ScoredDiscovery { discovery, score, related_count }
        })
        .collect();

    match params.sort_by {
        Some(SortBy::Relevance) if params.query.is_some() => {
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.discovery.updated_at.cmp(&a.discovery.updated_at))
            });
        }
        Some(SortBy::Score) => {
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.discovery.updated_at.cmp(&a.discovery.updated_at))
            });
        }
        Some(SortBy::RelatedCount) => {
            scored.sort_by(|a, b| {
                b.related_count
                    .cmp(&a.related_count)
                    .then_with(|| b.discovery.updated_at.cmp(&a.discovery.updated_at))
            });
        }
        _ => {
            scored.sort_by(|a, b| b.discovery.created_at.cmp(&a.discovery.created_at));
        }
    }

    if let Some(limit) = params.limit {
        scored.truncate(limit);
    }
    Ok(scored)
}

fn count_related(store: &UnitaresStore, id: Uuid) -> KnowledgeResult<usize> {
    Ok(store.edges_from(&id.to_string())?.len())
}

/// `text match × recency × tag overlap`, normalized to roughly [0, 1] (spec.md
/// §4.8 "Ranking contract").
fn relevance_score(discovery: &DiscoveryRecord, query: Option<&str>, tag: Option<&str>, now: DateTime<Utc>) -> f64 {
    let text_match = match query {
        Some(q) if !q.is_empty() => {
            let q_lower = q.to_lowercase();
            let haystack = format!("{} {} {}", discovery.summary, discovery.details, discovery.tags.join(" ")).to_lowercase();
            let occurrences = haystack.matches(&q_lower).count() as f64;
            (occurrences / 3.0).min(1.0).max(if haystack.contains(&q_lower) { 0.2 } else { 0.0 })
        }
        _ => 0.5,
    };

    let age_days = now.signed_duration_since(discovery.updated_at).num_seconds().max(0) as f64 / 86_400.0;
    let recency = 1.0 / (1.0 + age_days / 14.0);

    let tag_overlap = match tag {
        Some(t) if discovery.tags.iter().any(|x| x == t) => 1.0,
        Some(_) => 0.0,
        None => 0.5,
    };

    (text_match * 0.5) + (recency * 0.3) + (tag_overlap * 0.2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{store_discovery, NewDiscovery};

    fn store() -> UnitaresStore {
        UnitaresStore::open_temporary().unwrap()
    }

    fn seed(store: &UnitaresStore, summary: &str, age_days: i64) -> DiscoveryRecord {
        let now = Utc::now() - chrono::Duration::days(age_days);
        store_discovery(
            store,
            NewDiscovery {
                agent_id: "agent-1".to_string(),
                kind: DiscoveryKind::Insight,
                severity: Severity::Low,
                summary: summary.to_string(),
                details: "details".to_string(),
                tags: vec!["perf".to_string()],
                confidence: None,
                references_files: vec![],
                provenance: None,
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn relevance_requires_query_else_degrades_to_created_at() {
        let store = store();
        let old = seed(&store, "old finding", 10);
        let fresh = seed(&store, "fresh finding", 0);

        let results = search(
            &store,
            &SearchParams { sort_by: Some(SortBy::Relevance), ..Default::default() },
        )
        .unwrap();
        assert_eq!(results[0].discovery.id, fresh.id);
        assert_eq!(results[1].discovery.id, old.id);
    }

    #[test]
    fn relevance_scores_text_match_and_recency() {
        let store = store();
        seed(&store, "unrelated entry", 0);
        let matching = seed(&store, "token bucket rate limiter bypass", 0);

        let results = search(
            &store,
            &SearchParams {
                query: Some("bypass".to_string()),
                sort_by: Some(SortBy::Relevance),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(results[0].discovery.id, matching.id);
    }

    #[test]
    fn related_count_sort_prefers_more_connected_nodes() {
        use crate::graph::link_related;
        use unitares_store::EdgeType;

        let store = store();
        let a = seed(&store, "hub", 0);
        let b = seed(&store, "leaf", 0);
        link_related(&store, a.id, b.id, EdgeType::RelatedTo, Utc::now()).unwrap();

        let results = search(&store, &SearchParams { sort_by: Some(SortBy::RelatedCount), ..Default::default() }).unwrap();
        assert_eq!(results[0].discovery.id, a.id);
    }

    #[test]
    fn limit_truncates_results() {
        let store = store();
        seed(&store, "one", 0);
        seed(&store, "two", 0);
        seed(&store, "three", 0);

        let results = search(&store, &SearchParams { limit: Some(2), ..Default::default() }).unwrap();
        assert_eq!(results.len(), 2);
    }
}
