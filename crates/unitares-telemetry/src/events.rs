//! Event-type vocabulary and the append-only telemetry log (spec.md §4.12, C12).
//!
//! Built on top of `unitares_store`'s content-hash-deduplicated audit event
//! tree: a telemetry event is an audit event whose payload carries the
//! `confidence`/`details`/`metadata` triple the index groups queries around.
//! Grounded in `examples/original_source/src/audit_db.py`'s `AuditDB` (SQLite
//! index over the same append-only log), with its SQL aggregation translated
//! to the in-memory scan `unitares_store::query_audit_events` already does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use unitares_store::{AuditEventFilter, SortOrder, UnitaresStore};

use crate::error::{TelemetryError, TelemetryResult};

pub const EVENT_AUTO_ATTEST: &str = "auto_attest";
pub const EVENT_LAMBDA1_SKIP: &str = "lambda1_skip";
pub const EVENT_COMPLEXITY_DERIVATION: &str = "complexity_derivation";
pub const EVENT_CALIBRATION_CHECK: &str = "calibration_check";
pub const EVENT_AUTO_RESUME: &str = "auto_resume";
pub const EVENT_DIALECTIC_NUDGE: &str = "dialectic_nudge";
pub const EVENT_CROSS_DEVICE_CALL: &str = "cross_device_call";
pub const EVENT_ORCHESTRATION_REQUEST: &str = "orchestration_request";
pub const EVENT_ORCHESTRATION_COMPLETE: &str = "orchestration_complete";
pub const EVENT_DEVICE_HEALTH_CHECK: &str = "device_health_check";
pub const EVENT_RECOVERY: &str = "recovery";

/// A single row of the telemetry log, as returned by `query`/`fts_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub event_type: String,
    pub confidence: f64,
    pub details: Value,
    pub metadata: Option<Value>,
    pub raw_hash: String,
}

fn payload_of(confidence: f64, details: &Value, metadata: Option<&Value>) -> Value {
    serde_json::json!({
        "confidence": confidence,
        "details": details,
        "metadata": metadata,
    })
}

/// Records one telemetry event. Idempotent: a repeat with identical
/// `(agent_id, event_type, confidence, details, metadata)` returns the
/// existing row rather than duplicating it (spec.md §4.1 content-hash dedup).
pub fn record_event(
    store: &UnitaresStore,
    agent_id: &str,
    event_type: &str,
    confidence: f64,
    details: Value,
    metadata: Option<Value>,
    now: DateTime<Utc>,
) -> TelemetryResult<TelemetryEvent> {
    let payload = payload_of(confidence, &details, metadata.as_ref());
    let record = store.append_audit_event(agent_id, event_type, payload, now)?;
    Ok(TelemetryEvent {
        timestamp: record.timestamp,
        agent_id: record.agent_id,
        event_type: record.event_type,
        confidence,
        details,
        metadata,
        raw_hash: record.content_hash,
    })
}

fn event_from_payload(
    timestamp: DateTime<Utc>,
    agent_id: String,
    event_type: String,
    raw_hash: String,
    payload: Value,
) -> TelemetryEvent {
    let confidence = payload.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let details = payload.get("details").cloned().unwrap_or(Value::Null);
    let metadata = payload.get("metadata").cloned().filter(|v| !v.is_null());
    TelemetryEvent { timestamp, agent_id, event_type, confidence, details, metadata, raw_hash }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub order: SortOrder,
}

/// `query(agent_id?, event_type?, start?, end?, limit, order)` (spec.md §4.12).
pub fn query(store: &UnitaresStore, params: &QueryParams) -> TelemetryResult<Vec<TelemetryEvent>> {
    let filter = AuditEventFilter {
        agent_id: params.agent_id.clone(),
        event_type: params.event_type.clone(),
        start: params.start,
        end: params.end,
        text: None,
        order: params.order,
    };
    let mut rows = store.query_audit_events(&filter)?;
    if let Some(limit) = params.limit {
        rows.truncate(limit);
    }
    Ok(rows
        .into_iter()
        .map(|r| event_from_payload(r.timestamp, r.agent_id, r.event_type, r.content_hash, r.payload))
        .collect())
}

/// `fts_search(query, …)` over serialized details.
///
/// The store's audit index has no dedicated full-text engine; this degrades
/// to the same lowercase substring scan `unitares_store` already runs for its
/// `text` filter, which is the store-layer's consistent FTS-unavailable
/// fallback (mirrors `AuditDB.fts_search` returning `[]` when FTS5 is absent,
/// except here the scan itself never fails).
pub fn fts_search(
    store: &UnitaresStore,
    query_text: &str,
    agent_id: Option<&str>,
    event_type: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: usize,
) -> TelemetryResult<Vec<TelemetryEvent>> {
    let trimmed = query_text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let filter = AuditEventFilter {
        agent_id: agent_id.map(str::to_string),
        event_type: event_type.map(str::to_string),
        start,
        end,
        text: Some(trimmed.to_string()),
        order: SortOrder::Asc,
    };
    let mut rows = store.query_audit_events(&filter)?;
    rows.truncate(limit);
    Ok(rows
        .into_iter()
        .map(|r| event_from_payload(r.timestamp, r.agent_id, r.event_type, r.content_hash, r.payload))
        .collect())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SkipRateMetrics {
    pub total_updates: u64,
    pub total_skips: u64,
    pub skip_rate: f64,
    pub avg_confidence: f64,
}

/// `skip_rate_metrics(agent_id?, cutoff)` aggregating `auto_attest` vs
/// `lambda1_skip` events since `cutoff` (spec.md §4.12).
pub fn skip_rate_metrics(
    store: &UnitaresStore,
    agent_id: Option<&str>,
    cutoff: DateTime<Utc>,
) -> TelemetryResult<SkipRateMetrics> {
    let updates = store.query_audit_events(&AuditEventFilter {
        agent_id: agent_id.map(str::to_string),
        event_type: Some(EVENT_AUTO_ATTEST.to_string()),
        start: Some(cutoff),
        end: None,
        text: None,
        order: SortOrder::Asc,
    })?;
    let skips = store.query_audit_events(&AuditEventFilter {
        agent_id: agent_id.map(str::to_string),
        event_type: Some(EVENT_LAMBDA1_SKIP.to_string()),
        start: Some(cutoff),
        end: None,
        text: None,
        order: SortOrder::Asc,
    })?;

    let total_updates = updates.len() as u64;
    let total_skips = skips.len() as u64;
    let denom = total_updates + total_skips;
    let skip_rate = if denom > 0 { total_skips as f64 / denom as f64 } else { 0.0 };
    let avg_confidence = if skips.is_empty() {
        0.0
    } else {
        let sum: f64 = skips.iter().map(|r| r.payload.get("confidence").and_then(Value::as_f64).unwrap_or(0.0)).sum();
        sum / skips.len() as f64
    };

    Ok(SkipRateMetrics { total_updates, total_skips, skip_rate, avg_confidence })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Parses one JSONL line: `{timestamp, agent_id, event_type, confidence?, details?, metadata?}`.
fn parse_jsonl_line(line: &str) -> Option<(DateTime<Utc>, String, String, f64, Value, Option<Value>)> {
    let entry: Value = serde_json::from_str(line).ok()?;
    let timestamp = entry.get("timestamp")?.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())?.with_timezone(&Utc);
    let agent_id = entry.get("agent_id")?.as_str()?.to_string();
    let event_type = entry.get("event_type")?.as_str()?.to_string();
    let confidence = entry.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let details = entry.get("details").cloned().unwrap_or(Value::Null);
    let metadata = entry.get("metadata").cloned().filter(|v| !v.is_null());
    Some((timestamp, agent_id, event_type, confidence, details, metadata))
}

/// `backfill_from_jsonl(path, max_lines, batch_size)`: bounded, idempotent
/// ingest of a JSONL audit sink into the queryable index (spec.md §4.12).
///
/// `batch_size` has no transactional meaning over the embedded store (each
/// append already commits independently); it only bounds how often progress
/// is logged, the same role it plays as a commit-chunking knob in
/// `AuditDB.backfill_from_jsonl`.
pub fn backfill_from_jsonl(
    store: &UnitaresStore,
    path: &std::path::Path,
    max_lines: usize,
    batch_size: usize,
) -> TelemetryResult<BackfillReport> {
    if !path.exists() {
        return Err(TelemetryError::SourceNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let mut report = BackfillReport::default();

    for (i, line) in content.lines().enumerate() {
        if report.processed >= max_lines {
            break;
        }
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        report.processed += 1;

        match parse_jsonl_line(raw) {
            Some((timestamp, agent_id, event_type, confidence, details, metadata)) => {
                let payload = payload_of(confidence, &details, metadata.as_ref());
                let content_hash = UnitaresStore::audit_content_hash(&agent_id, &event_type, &payload);
                let before = store.query_audit_events(&AuditEventFilter {
                    agent_id: Some(agent_id.clone()),
                    event_type: Some(event_type.clone()),
                    ..Default::default()
                })?;
                let already_present = before.iter().any(|r| r.content_hash == content_hash);

                match store.append_audit_event(&agent_id, &event_type, payload, timestamp) {
                    Ok(_) if already_present => report.skipped += 1,
                    Ok(_) => report.inserted += 1,
                    Err(_) => report.errors += 1,
                }
            }
            None => {
                report.errors += 1;
                tracing::warn!(line = i, "skipping malformed backfill line");
            }
        }

        if batch_size > 0 && report.processed % batch_size == 0 {
            tracing::debug!(processed = report.processed, inserted = report.inserted, "backfill progress");
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn record_event_is_idempotent_and_round_trips_fields() {
        let store = UnitaresStore::open_temporary().unwrap();
        let now = Utc::now();
        let first = record_event(
            &store,
            "agent-1",
            EVENT_AUTO_ATTEST,
            0.9,
            serde_json::json!({"reason": "confident"}),
            None,
            now,
        )
        .unwrap();
        let second = record_event(
            &store,
            "agent-1",
            EVENT_AUTO_ATTEST,
            0.9,
            serde_json::json!({"reason": "confident"}),
            None,
            now,
        )
        .unwrap();
        assert_eq!(first.raw_hash, second.raw_hash);

        let rows = query(&store, &QueryParams { agent_id: Some("agent-1".to_string()), ..Default::default() }).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].confidence, 0.9);
        assert_eq!(rows[0].details["reason"], "confident");
    }

    #[test]
    fn query_respects_limit_and_order() {
        let store = UnitaresStore::open_temporary().unwrap();
        let t0 = Utc::now();
        for i in 0..3 {
            record_event(&store, "agent-1", EVENT_CALIBRATION_CHECK, 0.5, serde_json::json!({"n": i}), None, t0 + chrono::Duration::seconds(i))
                .unwrap();
        }
        let rows = query(
            &store,
            &QueryParams { agent_id: Some("agent-1".to_string()), limit: Some(2), order: SortOrder::Desc, ..Default::default() },
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].details["n"], 2);
    }

    #[test]
    fn fts_search_matches_details_text_and_empty_query_is_empty() {
        let store = UnitaresStore::open_temporary().unwrap();
        let now = Utc::now();
        record_event(&store, "agent-1", EVENT_DIALECTIC_NUDGE, 0.4, serde_json::json!({"note": "loop detected in reasoning"}), None, now)
            .unwrap();
        let hits = fts_search(&store, "loop detected", None, None, None, None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(fts_search(&store, "", None, None, None, None, 10).unwrap().is_empty());
    }

    #[test]
    fn skip_rate_metrics_aggregates_auto_attest_and_lambda1_skip() {
        let store = UnitaresStore::open_temporary().unwrap();
        let now = Utc::now();
        record_event(&store, "agent-1", EVENT_AUTO_ATTEST, 0.9, serde_json::json!({}), None, now).unwrap();
        record_event(&store, "agent-1", EVENT_AUTO_ATTEST, 0.9, serde_json::json!({"k": 1}), None, now).unwrap();
        record_event(&store, "agent-1", EVENT_LAMBDA1_SKIP, 0.3, serde_json::json!({}), None, now).unwrap();

        let metrics = skip_rate_metrics(&store, Some("agent-1"), now - chrono::Duration::hours(1)).unwrap();
        assert_eq!(metrics.total_updates, 2);
        assert_eq!(metrics.total_skips, 1);
        assert!((metrics.skip_rate - (1.0 / 3.0)).abs() < 1e-9);
        assert!((metrics.avg_confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn backfill_from_jsonl_is_idempotent_and_counts_malformed_lines() {
        let store = UnitaresStore::open_temporary().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_log.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"{{"timestamp": "2026-01-01T00:00:00Z", "agent_id": "agent-1", "event_type": "auto_attest", "confidence": 0.8, "details": {{"x": 1}}}}"#).unwrap();
        writeln!(f, "not json").unwrap();
        drop(f);

        let report = backfill_from_jsonl(&store, &path, 50_000, 2_000).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.errors, 1);

        let report2 = backfill_from_jsonl(&store, &path, 50_000, 2_000).unwrap();
        assert_eq!(report2.inserted, 0);
        assert_eq!(report2.skipped, 1);
    }

    #[test]
    fn backfill_missing_path_errors() {
        let store = UnitaresStore::open_temporary().unwrap();
        let result = backfill_from_jsonl(&store, std::path::Path::new("/nonexistent/audit.jsonl"), 10, 10);
        assert!(matches!(result, Err(TelemetryError::SourceNotFound(_))));
    }
}
