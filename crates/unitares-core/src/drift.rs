//! Ethical drift engine (spec.md §4.6, C6).
//!
//! Produces the drift vector Δη = (calibration, complexity, coherence, stability)
//! fed into the EISV dynamics, grounded in `examples/original_source/governance_core/ethical_drift.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::clip;

/// Four-component ethical drift vector. Each component lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EthicalDriftVector {
    pub calibration_deviation: f64,
    pub complexity_divergence: f64,
    pub coherence_deviation: f64,
    pub stability_deviation: f64,
}

impl EthicalDriftVector {
    pub fn zero() -> Self {
        Self {
            calibration_deviation: 0.0,
            complexity_divergence: 0.0,
            coherence_deviation: 0.0,
            stability_deviation: 0.0,
        }
    }

    /// `||Δη||`, used for reporting.
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// `||Δη||²`, fed directly into the EISV dynamics.
    pub fn norm_squared(&self) -> f64 {
        self.calibration_deviation.powi(2)
            + self.complexity_divergence.powi(2)
            + self.coherence_deviation.powi(2)
            + self.stability_deviation.powi(2)
    }
}

/// Per-agent EMA baselines plus recent-decision tracking used to compute deviations
/// (spec.md §3 "Ethical-drift baseline").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBaseline {
    pub baseline_coherence: f64,
    pub baseline_confidence: f64,
    pub baseline_complexity: f64,
    pub recent_decisions: VecDeque<String>,
    pub decision_consistency: f64,
    pub update_count: u32,
    pub alpha: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

const MAX_RECENT_DECISIONS: usize = 20;
/// Warmup window from spec.md §4.6: the first two updates post-reset are dampened
/// by `update_count / 2` (the original source used a 5-update ramp; spec.md is explicit
/// here and takes precedence).
const WARMUP_UPDATES: u32 = 2;

impl Default for AgentBaseline {
    fn default() -> Self {
        Self {
            baseline_coherence: 0.5,
            baseline_confidence: 0.6,
            baseline_complexity: 0.4,
            recent_decisions: VecDeque::new(),
            decision_consistency: 0.8,
            update_count: 0,
            alpha: 0.1,
            last_updated: None,
        }
    }
}

impl AgentBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the EMA baselines and decision-consistency tracker, then advances
    /// `update_count`.
    pub fn update(
        &mut self,
        coherence: Option<f64>,
        confidence: Option<f64>,
        complexity: Option<f64>,
        decision: Option<&str>,
        now: DateTime<Utc>,
    ) {
        if let Some(c) = coherence {
            self.baseline_coherence = self.alpha * c + (1.0 - self.alpha) * self.baseline_coherence;
        }
        if let Some(c) = confidence {
            self.baseline_confidence = self.alpha * c + (1.0 - self.alpha) * self.baseline_confidence;
        }
        if let Some(c) = complexity {
            self.baseline_complexity = self.alpha * c + (1.0 - self.alpha) * self.baseline_complexity;
        }
        if let Some(d) = decision {
            self.recent_decisions.push_back(d.to_string());
            if self.recent_decisions.len() > MAX_RECENT_DECISIONS {
                self.recent_decisions.pop_front();
            }
            self.update_decision_consistency();
        }
        self.update_count += 1;
        self.last_updated = Some(now);
    }

    fn update_decision_consistency(&mut self) {
        if self.recent_decisions.len() < 2 {
            self.decision_consistency = 0.8;
            return;
        }
        let transitions = self
            .recent_decisions
            .iter()
            .zip(self.recent_decisions.iter().skip(1))
            .filter(|(a, b)| a != b)
            .count();
        let max_transitions = self.recent_decisions.len() - 1;
        if max_transitions > 0 {
            let stability = 1.0 - (transitions as f64 / max_transitions as f64);
            self.decision_consistency = 0.3 * stability + 0.7 * self.decision_consistency;
        }
    }
}

/// Inputs to `compute_ethical_drift` beyond the stored baseline.
pub struct DriftInputs<'a> {
    pub current_coherence: f64,
    pub current_confidence: f64,
    pub complexity_divergence: f64,
    pub calibration_error: Option<f64>,
    pub decision: Option<&'a str>,
    /// Optional external velocity signal; when present and `>= 0.01`, floors
    /// `coherence_deviation`/`calibration_deviation` (spec.md §4.6 "State-velocity floor").
    pub state_velocity: Option<f64>,
    /// `exploration`/`introspection` task contexts attenuate calibration/complexity
    /// deviations by 0.3 (spec.md §4.6 "Epistemic attenuation").
    pub task_context: Option<&'a str>,
}

/// Computes the ethical drift vector and updates the baseline in place
/// (spec.md §4.6). Baseline update happens after reading the pre-update values,
/// matching the original source's ordering.
pub fn compute_ethical_drift(
    baseline: &mut AgentBaseline,
    inputs: DriftInputs<'_>,
    now: DateTime<Utc>,
) -> EthicalDriftVector {
    let mut calibration_deviation = match inputs.calibration_error {
        Some(err) => err.abs().min(1.0),
        None => (inputs.current_confidence - baseline.baseline_confidence).abs(),
    };
    let mut complexity_divergence = inputs.complexity_divergence.abs().min(1.0);
    let mut coherence_deviation = (inputs.current_coherence - baseline.baseline_coherence).abs();
    let mut stability_deviation = 1.0 - baseline.decision_consistency;

    if baseline.update_count < WARMUP_UPDATES {
        let warmup_factor = baseline.update_count as f64 / WARMUP_UPDATES as f64;
        calibration_deviation *= warmup_factor;
        complexity_divergence *= warmup_factor;
        coherence_deviation *= warmup_factor;
        stability_deviation *= warmup_factor;
    }

    if let Some(velocity) = inputs.state_velocity {
        if velocity >= 0.01 {
            coherence_deviation = coherence_deviation.max(0.5 * velocity.min(0.5));
            calibration_deviation = calibration_deviation.max(0.3 * velocity.min(0.5));
        }
    }

    if matches!(inputs.task_context, Some("exploration") | Some("introspection")) {
        calibration_deviation *= 0.3;
        complexity_divergence *= 0.3;
    }

    baseline.update(
        Some(inputs.current_coherence),
        Some(inputs.current_confidence),
        Some(1.0 - inputs.complexity_divergence),
        inputs.decision,
        now,
    );

    EthicalDriftVector {
        calibration_deviation: clip(calibration_deviation, 0.0, 1.0),
        complexity_divergence: clip(complexity_divergence, 0.0, 1.0),
        coherence_deviation: clip(coherence_deviation, 0.0, 1.0),
        stability_deviation: clip(stability_deviation, 0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_dampens_first_two_updates() {
        let mut baseline = AgentBaseline::new();
        let now = Utc::now();

        let v0 = compute_ethical_drift(
            &mut baseline,
            DriftInputs {
                current_coherence: 0.9,
                current_confidence: 0.9,
                complexity_divergence: 0.9,
                calibration_error: None,
                decision: None,
                state_velocity: None,
                task_context: None,
            },
            now,
        );
        // update_count was 0 at computation time -> warmup_factor 0 -> all dampened components are 0.
        assert_eq!(v0.coherence_deviation, 0.0);

        let v1 = compute_ethical_drift(
            &mut baseline,
            DriftInputs {
                current_coherence: 0.9,
                current_confidence: 0.9,
                complexity_divergence: 0.9,
                calibration_error: None,
                decision: None,
                state_velocity: None,
                task_context: None,
            },
            now,
        );
        assert!(v1.coherence_deviation > 0.0);

        let v2 = compute_ethical_drift(
            &mut baseline,
            DriftInputs {
                current_coherence: 0.1,
                current_confidence: 0.1,
                complexity_divergence: 0.9,
                calibration_error: None,
                decision: None,
                state_velocity: None,
                task_context: None,
            },
            now,
        );
        // update_count is now 2 (>= WARMUP_UPDATES) -> full scaling.
        assert!(v2.coherence_deviation > v1.coherence_deviation);
    }

    #[test]
    fn epistemic_attenuation_reduces_calibration_and_complexity() {
        let mut baseline = AgentBaseline::new();
        baseline.update_count = 10; // past warmup
        let now = Utc::now();

        let normal = compute_ethical_drift(
            &mut baseline.clone(),
            DriftInputs {
                current_coherence: 0.5,
                current_confidence: 0.1,
                complexity_divergence: 0.5,
                calibration_error: None,
                decision: None,
                state_velocity: None,
                task_context: None,
            },
            now,
        );
        let attenuated = compute_ethical_drift(
            &mut baseline,
            DriftInputs {
                current_coherence: 0.5,
                current_confidence: 0.1,
                complexity_divergence: 0.5,
                calibration_error: None,
                decision: None,
                state_velocity: None,
                task_context: Some("exploration"),
            },
            now,
        );
        assert!(attenuated.calibration_deviation < normal.calibration_deviation);
        assert!(attenuated.complexity_divergence < normal.complexity_divergence);
    }

    #[test]
    fn velocity_floor_raises_deviations() {
        let mut baseline = AgentBaseline::new();
        baseline.update_count = 10;
        let now = Utc::now();
        let v = compute_ethical_drift(
            &mut baseline,
            DriftInputs {
                current_coherence: 0.5,
                current_confidence: 0.5,
                complexity_divergence: 0.0,
                calibration_error: Some(0.0),
                decision: None,
                state_velocity: Some(0.4),
                task_context: None,
            },
            now,
        );
        assert!(v.coherence_deviation >= 0.2 - 1e-9);
        assert!(v.calibration_deviation >= 0.12 - 1e-9);
    }
}
