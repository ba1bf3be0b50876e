//! Shared scalar types used across the governance core and its satellite crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lifecycle status of an agent identity (spec.md §3 Identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Active,
    Paused,
    Archived,
    Deleted,
    WaitingInput,
    Moderate,
}

impl std::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Paused => "paused",
            IdentityStatus::Archived => "archived",
            IdentityStatus::Deleted => "deleted",
            IdentityStatus::WaitingInput => "waiting_input",
            IdentityStatus::Moderate => "moderate",
        };
        f.write_str(s)
    }
}

/// Categorical regime label for the EISV dynamics (§4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Exploration,
    Convergence,
    Divergence,
    Locked,
    Transition,
}

/// Governance decision returned to the caller (§4.4 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Proceed,
    Guide,
    Pause,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Proceed => "proceed",
            Decision::Guide => "guide",
            Decision::Pause => "pause",
            Decision::Reject => "reject",
        };
        f.write_str(s)
    }
}

/// Health status derived from risk/coherence/void (§4.4 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Fixed-capacity FIFO history. Appending past capacity drops the oldest entry,
/// matching the "histories are bounded" invariant in spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded history capacity must be positive");
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn as_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Clip a value into `[min, max]`.
#[inline]
pub fn clip(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Structured representation of a parsed dialectic condition (spec.md §4.9 "Condition grammar").
/// The grammar itself lives in `unitares-dialectic`; this type is shared so `AgentState` can
/// hold applied conditions without a circular dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCondition {
    pub action: ConditionAction,
    pub target: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub direction: Option<String>,
    pub original: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAction {
    Set,
    Reduce,
    Increase,
    Monitor,
    Limit,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_history_drops_oldest() {
        let mut h: BoundedHistory<i32> = BoundedHistory::new(3);
        for i in 0..5 {
            h.push(i);
        }
        assert_eq!(h.as_vec(), vec![2, 3, 4]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn clip_bounds() {
        assert_eq!(clip(-1.0, 0.0, 1.0), 0.0);
        assert_eq!(clip(2.0, 0.0, 1.0), 1.0);
        assert_eq!(clip(0.5, 0.0, 1.0), 0.5);
    }
}
