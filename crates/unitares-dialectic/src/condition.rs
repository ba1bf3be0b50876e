//! Natural-language condition grammar (spec.md §4.9 "Condition grammar").
//!
//! Grounded in `examples/original_source/src/mcp_handlers/condition_parser.py`:
//! five ordered regex patterns, first match wins, unknown syntax is stored
//! verbatim rather than rejected.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use unitares_core::types::{ConditionAction, ParsedCondition};

static PATTERN_SET_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(reduce|increase|set|lower|raise)\s+(\w+)\s+to\s+([\d.]+)").unwrap());
static PATTERN_MONITOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)monitor\s+for\s+([\d.]+)\s*(hours?|minutes?|h|m)\b").unwrap());
static PATTERN_KEEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)keep\s+(\w+)\s+(below|above|under|over)\s+([\d.]+)").unwrap());
static PATTERN_LIMIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)limit\s+(\w+)\s+to\s+([\d.]+)").unwrap());
static PATTERN_SET_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)set\s+(\w+)\s+([\d.]+)").unwrap());

/// Normalizes target aliases (spec.md §4.9 "Target aliases normalized").
fn normalize_target(target: &str) -> String {
    match target.to_lowercase().as_str() {
        "risk" | "risk_score" => "risk_score".to_string(),
        "monitor" | "monitoring" | "duration" | "time" => "monitoring_duration".to_string(),
        other => other.to_string(),
    }
}

/// Parses one natural-language condition string (spec.md §4.9). Unparseable
/// input returns `{action: unknown}` with the original text preserved for
/// audit rather than erroring.
pub fn parse_condition(condition: &str, now: DateTime<Utc>) -> ParsedCondition {
    if let Some(caps) = PATTERN_SET_VALUE.captures(condition) {
        let action = match caps[1].to_lowercase().as_str() {
            "reduce" | "lower" => ConditionAction::Reduce,
            "increase" | "raise" => ConditionAction::Increase,
            _ => ConditionAction::Set,
        };
        return ParsedCondition {
            action,
            target: normalize_target(&caps[2]),
            value: caps[3].parse().ok(),
            unit: None,
            direction: None,
            original: condition.to_string(),
            applied_at: now,
        };
    }

    if let Some(caps) = PATTERN_MONITOR.captures(condition) {
        let unit = if caps[2].to_lowercase().starts_with('h') { "hours" } else { "minutes" };
        return ParsedCondition {
            action: ConditionAction::Monitor,
            target: "monitoring_duration".to_string(),
            value: caps[1].parse().ok(),
            unit: Some(unit.to_string()),
            direction: None,
            original: condition.to_string(),
            applied_at: now,
        };
    }

    if let Some(caps) = PATTERN_KEEP.captures(condition) {
        let direction = if matches!(caps[2].to_lowercase().as_str(), "below" | "under") { "below" } else { "above" };
        return ParsedCondition {
            action: ConditionAction::Limit,
            target: normalize_target(&caps[1]),
            value: caps[3].parse().ok(),
            unit: None,
            direction: Some(direction.to_string()),
            original: condition.to_string(),
            applied_at: now,
        };
    }

    if let Some(caps) = PATTERN_LIMIT.captures(condition) {
        return ParsedCondition {
            action: ConditionAction::Limit,
            target: normalize_target(&caps[1]),
            value: caps[2].parse().ok(),
            unit: None,
            direction: None,
            original: condition.to_string(),
            applied_at: now,
        };
    }

    if let Some(caps) = PATTERN_SET_BARE.captures(condition) {
        return ParsedCondition {
            action: ConditionAction::Set,
            target: normalize_target(&caps[1]),
            value: caps[2].parse().ok(),
            unit: None,
            direction: None,
            original: condition.to_string(),
            applied_at: now,
        };
    }

    tracing::warn!(condition, "could not parse dialectic condition");
    ParsedCondition {
        action: ConditionAction::Unknown,
        target: "unknown".to_string(),
        value: None,
        unit: None,
        direction: None,
        original: condition.to_string(),
        applied_at: now,
    }
}
