//! Dual-log continuity layer (spec.md §4.5, C5).
//!
//! Compares operational (server-derived) and reflective (agent-reported) logs to
//! produce the grounded EISV inputs that feed the governance engine. This is the
//! "grounding mechanism" referenced in `examples/original_source/governance_core/ethical_drift.py`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{clip, BoundedHistory};

const KNOWN_TOOLS: &[&str] = &[
    "store_knowledge",
    "search_knowledge",
    "get_discovery_details",
    "update_discovery_status_graph",
    "leave_note",
    "cleanup_knowledge_graph",
    "request_dialectic_review",
    "submit_thesis",
    "submit_antithesis",
    "submit_synthesis",
    "self_recovery_review",
    "quick_resume",
    "calibration",
    "check_calibration",
    "onboard",
    "identity",
    "process_agent_update",
];

static CODE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```").unwrap());
static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+[.)])\s+").unwrap());

/// Server-derived record of a single agent response (spec.md §3 Operational log entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub response_tokens: u64,
    pub response_chars: u64,
    pub has_code_blocks: bool,
    pub code_block_count: u32,
    pub list_item_count: u32,
    pub paragraph_count: u32,
    pub question_count: u32,
    pub latency_ms: Option<u64>,
    pub client_session_id: String,
    pub is_session_continuation: bool,
    pub topic_hash: String,
    pub mentioned_tools: Vec<String>,
}

/// Agent-reported record of the same update (spec.md §3 Reflective log entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectiveEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub self_complexity: Option<f64>,
    pub self_confidence: Option<f64>,
    pub task_type: Option<String>,
    pub notes_count: u32,
    pub insights_count: u32,
    pub questions_count: u32,
}

/// Derived grounding metrics produced by comparing the two logs (spec.md §3 Continuity metrics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityMetrics {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub derived_complexity: f64,
    pub self_complexity: Option<f64>,
    pub complexity_divergence: f64,
    pub overconfidence_signal: bool,
    pub underconfidence_signal: bool,
    pub e_input: f64,
    pub i_input: f64,
    pub s_input: f64,
    pub calibration_weight: f64,
}

/// Analyzed response-text features, the basis for `derive_complexity` (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct ResponseFeatures {
    pub tokens: u64,
    pub chars: u64,
    pub has_code_blocks: bool,
    pub code_block_count: u32,
    pub list_item_count: u32,
    pub paragraph_count: u32,
    pub question_count: u32,
    pub topic_hash: String,
    pub mentioned_tools: Vec<String>,
}

/// Deterministic feature extraction from a response string (spec.md §4.5 "Analyze response text",
/// tested by the seed scenario in spec.md §8.1).
pub fn analyze_response_text(text: &str) -> ResponseFeatures {
    let chars = text.chars().count() as u64;
    let tokens = chars / 4;

    let fence_count = CODE_BLOCK_RE.find_iter(text).count();
    let code_block_count = (fence_count / 2) as u32;
    let has_code_blocks = code_block_count > 0;

    let list_item_count = LIST_ITEM_RE.find_iter(text).count() as u32;

    let paragraph_count = text
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .count() as u32;

    let question_count = text.matches('?').count() as u32;

    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let topic_hash = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect::<String>();

    let lower = text.to_lowercase();
    let mentioned_tools: Vec<String> = KNOWN_TOOLS
        .iter()
        .filter(|t| lower.contains(&t.to_lowercase()))
        .map(|t| t.to_string())
        .collect();

    ResponseFeatures {
        tokens,
        chars,
        has_code_blocks,
        code_block_count,
        list_item_count,
        paragraph_count,
        question_count,
        topic_hash,
        mentioned_tools,
    }
}

/// Weighted combination of response features into a complexity score in `[0, 1]`
/// (spec.md §4.5 "Derive complexity"). Weights are declared heuristic; their value
/// is relative-ordering consistency, not absolute truth.
pub fn derive_complexity(features: &ResponseFeatures) -> f64 {
    let token_factor = if features.tokens > 0 {
        ((1.0 + features.tokens as f64).ln() / (1.0 + 2000.0_f64).ln()).min(1.0)
    } else {
        0.0
    };

    let mut structure_factor = 0.0;
    if features.has_code_blocks {
        structure_factor += 0.25 * (features.code_block_count as f64 / 3.0).min(1.0);
    }
    if features.list_item_count > 3 {
        structure_factor += 0.15 * ((features.list_item_count - 3) as f64 / 10.0).min(1.0);
    }
    if features.paragraph_count > 2 {
        structure_factor += 0.10 * ((features.paragraph_count - 2) as f64 / 5.0).min(1.0);
    }

    let tool_factor = 0.15 * (features.mentioned_tools.len() as f64 / 4.0).min(1.0);
    let question_factor = 0.05 * (features.question_count as f64 / 3.0).min(1.0);

    let combined =
        0.45 * token_factor + 0.30 * structure_factor + 0.15 * tool_factor + 0.10 * question_factor;

    clip(combined, 0.0, 1.0)
}

/// Builds an `OperationalEntry` from a raw response, continuing the previous session
/// tracking state (previous session id / timestamp) the way `create_operational_entry`
/// does in the original source.
pub fn create_operational_entry(
    agent_id: &str,
    response_text: &str,
    client_session_id: &str,
    prev_session_id: Option<&str>,
    now: DateTime<Utc>,
) -> OperationalEntry {
    let features = analyze_response_text(response_text);
    let is_session_continuation = prev_session_id
        .map(|p| p == client_session_id)
        .unwrap_or(false);
    OperationalEntry {
        timestamp: now,
        agent_id: agent_id.to_string(),
        response_tokens: features.tokens,
        response_chars: features.chars,
        has_code_blocks: features.has_code_blocks,
        code_block_count: features.code_block_count,
        list_item_count: features.list_item_count,
        paragraph_count: features.paragraph_count,
        question_count: features.question_count,
        latency_ms: None,
        client_session_id: client_session_id.to_string(),
        is_session_continuation,
        topic_hash: features.topic_hash,
        mentioned_tools: features.mentioned_tools,
    }
}

/// Computes continuity metrics from an operational/reflective pair (spec.md §4.5).
///
/// `prev_derived_complexity` implements the rate-of-change fallback from
/// `dual_log/continuity.py` §3b: when there is no self-reported complexity, divergence
/// is the absolute change from the previous derived complexity, not a flat default —
/// the flat `0.2` default applies only when there is no self-report *and* no prior
/// observation at all.
pub fn compute_continuity_metrics(
    op: &OperationalEntry,
    refl: &ReflectiveEntry,
    prev_derived_complexity: Option<f64>,
    calibration_weight: f64,
) -> ContinuityMetrics {
    let derived_complexity = derive_complexity(&ResponseFeatures {
        tokens: op.response_tokens,
        chars: op.response_chars,
        has_code_blocks: op.has_code_blocks,
        code_block_count: op.code_block_count,
        list_item_count: op.list_item_count,
        paragraph_count: op.paragraph_count,
        question_count: op.question_count,
        topic_hash: op.topic_hash.clone(),
        mentioned_tools: op.mentioned_tools.clone(),
    });

    let complexity_divergence = match refl.self_complexity {
        Some(self_complexity) => (derived_complexity - self_complexity).abs(),
        None => match prev_derived_complexity {
            Some(prev) => (derived_complexity - prev).abs().min(1.0),
            None => 0.2,
        },
    };

    let overconfidence_signal = refl
        .self_confidence
        .map(|c| c > 0.8 && derived_complexity > 0.6)
        .unwrap_or(false);
    let underconfidence_signal = refl
        .self_confidence
        .map(|c| c < 0.3 && derived_complexity < 0.3)
        .unwrap_or(false);

    let e_input = match op.latency_ms {
        Some(latency_ms) if latency_ms > 0 => {
            let tokens_per_sec = op.response_tokens as f64 / (latency_ms as f64 / 1000.0);
            clip(tokens_per_sec / 200.0, 0.3, 1.0)
        }
        _ => clip(0.5 + 0.3 * (op.response_tokens as f64 / 1000.0), 0.3, 1.0),
    };

    let i_input = 1.0 - complexity_divergence;

    let s_input = clip(
        0.1 + 0.5 * complexity_divergence
            + if !op.is_session_continuation { 0.1 } else { 0.0 }
            + if refl.self_complexity.is_none() { 0.1 } else { 0.0 },
        0.0,
        1.0,
    );

    ContinuityMetrics {
        timestamp: op.timestamp,
        agent_id: op.agent_id.clone(),
        derived_complexity,
        self_complexity: refl.self_complexity,
        complexity_divergence,
        overconfidence_signal,
        underconfidence_signal,
        e_input,
        i_input,
        s_input,
        calibration_weight,
    }
}

/// Per-agent bounded sequences of operational/reflective/continuity records, retained
/// for 7 days and capped at 100 entries (spec.md §4.5 "Storage").
pub struct ContinuityLog {
    pub operational: BoundedHistory<OperationalEntry>,
    pub reflective: BoundedHistory<ReflectiveEntry>,
    pub continuity: BoundedHistory<ContinuityMetrics>,
    prev_session_id: Option<String>,
    prev_derived_complexity: Option<f64>,
}

const MAX_LOG_ENTRIES: usize = 100;
pub const LOG_RETENTION_DAYS: i64 = 7;

impl Default for ContinuityLog {
    fn default() -> Self {
        Self {
            operational: BoundedHistory::new(MAX_LOG_ENTRIES),
            reflective: BoundedHistory::new(MAX_LOG_ENTRIES),
            continuity: BoundedHistory::new(MAX_LOG_ENTRIES),
            prev_session_id: None,
            prev_derived_complexity: None,
        }
    }
}

impl ContinuityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one check-in through the dual-log architecture: builds both entries,
    /// derives continuity metrics, and advances the rate-of-change tracking state.
    pub fn process_update(
        &mut self,
        agent_id: &str,
        response_text: &str,
        self_complexity: Option<f64>,
        self_confidence: Option<f64>,
        client_session_id: &str,
        task_type: Option<String>,
        now: DateTime<Utc>,
        calibration_weight: f64,
    ) -> ContinuityMetrics {
        let op = create_operational_entry(
            agent_id,
            response_text,
            client_session_id,
            self.prev_session_id.as_deref(),
            now,
        );
        let refl = ReflectiveEntry {
            timestamp: now,
            agent_id: agent_id.to_string(),
            self_complexity,
            self_confidence,
            task_type,
            notes_count: 0,
            insights_count: 0,
            questions_count: 0,
        };

        let metrics = compute_continuity_metrics(
            &op,
            &refl,
            self.prev_derived_complexity,
            calibration_weight,
        );

        self.prev_derived_complexity = Some(metrics.derived_complexity);
        self.prev_session_id = Some(client_session_id.to_string());

        self.operational.push(op);
        self.reflective.push(refl);
        self.continuity.push(metrics.clone());

        metrics
    }

    pub fn cumulative_divergence(&self, window_count: usize) -> f64 {
        self.continuity
            .iter()
            .rev()
            .take(window_count)
            .map(|m| m.complexity_divergence)
            .sum()
    }
}

/// Restorative-balance monitor (spec.md §4.5 "Restorative-balance monitor").
///
/// Tracks `(timestamp, divergence)` pairs in a sliding 5-minute window and recommends
/// a cooldown when activity or cumulative divergence exceeds configured thresholds.
pub struct RestorativeMonitor {
    window_secs: i64,
    activity_threshold: usize,
    divergence_threshold: f64,
    events: VecDeque<(DateTime<Utc>, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorativeAssessment {
    pub needs_restoration: bool,
    pub window_count: usize,
    pub window_divergence_sum: f64,
    pub suggested_cooldown_secs: f64,
}

impl RestorativeMonitor {
    pub fn new(window_secs: i64, activity_threshold: usize, divergence_threshold: f64) -> Self {
        Self {
            window_secs,
            activity_threshold,
            divergence_threshold,
            events: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(self.window_secs);
        while let Some((ts, _)) = self.events.front() {
            if *ts < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a new continuity update and re-evaluates the sliding window.
    pub fn record(&mut self, now: DateTime<Utc>, divergence: f64) -> RestorativeAssessment {
        self.events.push_back((now, divergence));
        self.prune(now);

        let window_count = self.events.len();
        let window_divergence_sum: f64 = self.events.iter().map(|(_, d)| d).sum();

        let needs_restoration = window_count > self.activity_threshold
            || window_divergence_sum > self.divergence_threshold;

        let excess_count = window_count.saturating_sub(self.activity_threshold) as f64;
        let excess_div = (window_divergence_sum - self.divergence_threshold).max(0.0);
        let suggested_cooldown_secs = if needs_restoration {
            (5.0 + 5.0 * excess_count + 100.0 * excess_div).min(300.0)
        } else {
            0.0
        };

        RestorativeAssessment {
            needs_restoration,
            window_count,
            window_divergence_sum,
            suggested_cooldown_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_scenario_code_heavy_response() {
        let text = "Here is a fix:\n```python\nprint('x')\n```\n- step one\n- step two\n- step three\n- step four\n";
        let features = analyze_response_text(text);
        assert!(features.has_code_blocks);
        assert_eq!(features.code_block_count, 1);
        assert_eq!(features.list_item_count, 4);
        assert!(features.paragraph_count >= 2);

        let derived = derive_complexity(&features);
        assert!(derived > 0.25 && derived < 0.55, "derived={derived}");
    }

    #[test]
    fn topic_hash_is_deterministic() {
        let text = "hello   world\nfoo bar";
        let a = analyze_response_text(text);
        let b = analyze_response_text("hello world foo bar");
        assert_eq!(a.topic_hash, b.topic_hash);
    }

    #[test]
    fn divergence_falls_back_to_rate_of_change() {
        let op = create_operational_entry("agent-1", "short", "sess-1", None, Utc::now());
        let refl = ReflectiveEntry {
            timestamp: Utc::now(),
            agent_id: "agent-1".into(),
            self_complexity: None,
            self_confidence: None,
            task_type: None,
            notes_count: 0,
            insights_count: 0,
            questions_count: 0,
        };
        let metrics_first = compute_continuity_metrics(&op, &refl, None, 0.5);
        assert_eq!(metrics_first.complexity_divergence, 0.2);

        let metrics_second =
            compute_continuity_metrics(&op, &refl, Some(metrics_first.derived_complexity), 0.5);
        assert_eq!(metrics_second.complexity_divergence, 0.0);
    }

    #[test]
    fn restorative_monitor_flags_excess_activity() {
        let mut monitor = RestorativeMonitor::new(300, 2, 10.0);
        let now = Utc::now();
        monitor.record(now, 0.0);
        monitor.record(now, 0.0);
        let third = monitor.record(now, 0.0);
        assert!(third.needs_restoration);
        assert!(third.suggested_cooldown_secs > 0.0);
    }
}
