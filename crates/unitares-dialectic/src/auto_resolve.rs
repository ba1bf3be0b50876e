//! Background sweep resolving stuck dialectic sessions (spec.md §4.9 "Auto-resolve").
//!
//! Grounded in `examples/original_source/src/mcp_handlers/dialectic_auto_resolve.py`:
//! sessions inactive past the stuck threshold (default 2 hours, chosen over
//! earlier 5-30 minute values as too aggressive for real deliberation) are
//! failed with a synthetic system message. Timestamps are UTC throughout.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use unitares_store::{DialecticMessageRecord, UnitaresStore};

use crate::error::DialecticResult;

pub const DEFAULT_STUCK_THRESHOLD_HOURS: i64 = 2;

#[derive(Debug, Clone, Default)]
pub struct AutoResolveReport {
    pub resolved_session_ids: Vec<Uuid>,
}

/// Scans active sessions and fails any whose `updated_at` is older than
/// `stuck_threshold`, appending a synthetic `system` message stating why.
pub fn auto_resolve_stuck_sessions(
    store: &UnitaresStore,
    stuck_threshold: Duration,
    now: DateTime<Utc>,
) -> DialecticResult<AutoResolveReport> {
    let threshold_time = now - stuck_threshold;
    let mut report = AutoResolveReport::default();

    for mut session in store.list_active_dialectic_sessions()? {
        if session.updated_at >= threshold_time {
            continue;
        }

        let minutes = stuck_threshold.num_seconds() as f64 / 60.0;
        let reason = format!("session auto-resolved: inactive for >{minutes:.0} minutes");

        let seq = store.list_dialectic_messages(session.id)?.len() as u32;
        store.append_dialectic_message(&DialecticMessageRecord {
            id: Uuid::new_v4(),
            session_id: session.id,
            seq,
            agent_id: "system".to_string(),
            message_type: "failed".to_string(),
            content: serde_json::json!({"reason": reason}),
            signature: None,
            created_at: now,
        })?;

        session.phase = "failed".to_string();
        session.status = "failed".to_string();
        session.active = false;
        session.updated_at = now;
        store.upsert_dialectic_session(&session)?;

        tracing::warn!(session_id = %session.id, reason, "dialectic session auto-resolved as stuck");
        report.resolved_session_ids.push(session.id);
    }

    Ok(report)
}

/// Convenience wrapper using the spec default (2-hour) stuck threshold.
pub fn auto_resolve_default(store: &UnitaresStore, now: DateTime<Utc>) -> DialecticResult<AutoResolveReport> {
    auto_resolve_stuck_sessions(store, Duration::hours(DEFAULT_STUCK_THRESHOLD_HOURS), now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::request_dialectic_review;

    #[test]
    fn stuck_sessions_are_failed_with_system_message() {
        let store = UnitaresStore::open_temporary().unwrap();
        let now = Utc::now();
        let old_session = request_dialectic_review(&store, "paused-1", None, None, None, None, now - Duration::hours(3)).unwrap();

        let report = auto_resolve_default(&store, now).unwrap();
        assert_eq!(report.resolved_session_ids, vec![old_session.id]);

        let session = store.get_dialectic_session(old_session.id).unwrap().unwrap();
        assert_eq!(session.phase, "failed");
        assert!(!session.active);

        let messages = store.list_dialectic_messages(old_session.id).unwrap();
        assert_eq!(messages.last().unwrap().agent_id, "system");
    }

    #[test]
    fn fresh_sessions_are_left_alone() {
        let store = UnitaresStore::open_temporary().unwrap();
        let now = Utc::now();
        request_dialectic_review(&store, "paused-2", None, None, None, None, now).unwrap();

        let report = auto_resolve_default(&store, now).unwrap();
        assert!(report.resolved_session_ids.is_empty());
    }
}
